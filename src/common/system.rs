use nix::unistd::{Uid, User};

use crate::common::{Result, WebdeskError};
use crate::desktop::Account;

pub struct System {
}

impl System {
    pub fn get_current_user_uid() -> u32 {
        Uid::effective().as_raw()
    }

    /// Resolves a user account from its name.
    ///
    /// # Arguments
    /// * `username` - The name of the user.
    ///
    /// # Returns
    /// The `Account` of the user or a `SystemError` if the user does not exist.
    pub fn get_account(username: &str) -> Result<Account> {
        let user = User::from_name(username)?
            .ok_or_else(|| WebdeskError::SystemError(format!("User {} does not exist", username)))?;

        Account::from_user(user)
            .ok_or_else(|| WebdeskError::SystemError(format!("User {} has an invalid home directory", username)))
    }
}
