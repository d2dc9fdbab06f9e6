use std::fmt;

use nix::unistd::User;
use users::{get_group_by_name, get_user_groups};

/// The `Account` struct represents the user owning the remote desktop session.
#[derive(Clone, Debug)]
pub struct Account {
    username: String,
    home: String,
    uid: u32,
    gid: u32,
    groups: Vec<u32>
}

impl Account {
    pub fn new(username: &str, home: &str, uid: u32, gid: u32, groups: Vec<u32>) -> Self {
        Self {
            username: username.to_string(),
            home: home.to_string(),
            uid,
            gid,
            groups,
        }
    }

    pub fn username(&self) -> &str {
        &self.username
    }

    pub fn home(&self) -> &str {
        &self.home
    }

    pub fn uid(&self) -> u32 {
        self.uid
    }

    pub fn gid(&self) -> u32 {
        self.gid
    }

    pub fn groups(&self) -> &[u32] {
        &self.groups
    }

    /// Path of a file or directory relative to the home directory.
    pub fn home_path(&self, relative: &str) -> String {
        format!("{}/{}", self.home.trim_end_matches('/'), relative)
    }

    /// Checks whether the account belongs to the named group.
    ///
    /// # Returns
    /// `None` if the group does not exist on the system.
    pub fn is_member_of(&self, group_name: &str) -> Option<bool> {
        let group = get_group_by_name(group_name)?;
        let gid = group.gid();
        Some(self.gid == gid || self.groups.contains(&gid))
    }

    /// Builds the account of a system user, including its supplementary groups.
    /// The root group is only kept for the root user.
    ///
    /// # Returns
    /// `None` if the home directory is not valid UTF-8.
    pub fn from_user(user: User) -> Option<Account> {
        let home = user.dir.to_str()?;
        let (uid, gid) = (user.uid.as_raw(), user.gid.as_raw());

        let groups = get_user_groups(&user.name, gid)
            .unwrap_or_default()
            .into_iter()
            .map(|group| group.gid())
            .filter(|&group_id| uid == 0 || group_id != 0)
            .collect();

        Some(Account::new(&user.name, home, uid, gid, groups))
    }
}

impl fmt::Display for Account {
    fn fmt(&self, formatter: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(formatter, "{} (uid {}, gid {}, home {})", self.username, self.uid, self.gid, self.home)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn home_path_joins_without_double_separator() {
        let account = Account::new("alice", "/home/alice/", 1000, 1000, vec![]);
        assert_eq!(account.home_path(".vnc/passwd"), "/home/alice/.vnc/passwd");
    }

    #[test]
    fn display_names_the_user() {
        let account = Account::new("alice", "/home/alice", 1000, 1000, vec![27]);
        assert_eq!(account.to_string(), "alice (uid 1000, gid 1000, home /home/alice)");
    }

    #[test]
    fn unknown_group_has_no_membership() {
        let account = Account::new("alice", "/home/alice", 1000, 1000, vec![]);
        assert_eq!(account.is_member_of("webdesk-group-that-does-not-exist"), None);
    }
}
