use std::fmt;

/// Escapes the characters that are not allowed verbatim in XML text and attribute values.
pub fn escape(value: &str) -> String {
    let mut escaped = String::with_capacity(value.len());
    for c in value.chars() {
        match c {
            '&' => escaped.push_str("&amp;"),
            '<' => escaped.push_str("&lt;"),
            '>' => escaped.push_str("&gt;"),
            '"' => escaped.push_str("&quot;"),
            '\'' => escaped.push_str("&apos;"),
            _ => escaped.push(c),
        }
    }
    escaped
}

#[derive(Clone, Debug)]
enum XmlNode {
    Element(XmlElement),
    Text(String),
}

/// A minimal XML element model. All text and attribute values are escaped when serialised.
#[derive(Clone, Debug)]
pub struct XmlElement {
    name: String,
    attributes: Vec<(String, String)>,
    children: Vec<XmlNode>,
}

impl XmlElement {
    pub fn new(name: &str) -> Self {
        Self {
            name: name.to_string(),
            attributes: Vec::new(),
            children: Vec::new(),
        }
    }

    pub fn attribute(mut self, name: &str, value: &str) -> Self {
        self.attributes.push((name.to_string(), value.to_string()));
        self
    }

    pub fn child(mut self, child: XmlElement) -> Self {
        self.children.push(XmlNode::Element(child));
        self
    }

    pub fn text(mut self, text: &str) -> Self {
        self.children.push(XmlNode::Text(text.to_string()));
        self
    }

    /// Serialises the element as a document with an XML declaration.
    pub fn to_document(&self) -> String {
        format!("<?xml version=\"1.0\" encoding=\"UTF-8\"?>\n{}\n", self)
    }

    fn write_indented(&self, formatter: &mut fmt::Formatter<'_>, depth: usize) -> fmt::Result {
        let indent = "    ".repeat(depth);
        write!(formatter, "{}<{}", indent, self.name)?;
        for (name, value) in &self.attributes {
            write!(formatter, " {}=\"{}\"", name, escape(value))?;
        }

        if self.children.is_empty() {
            return write!(formatter, "/>");
        }

        // Elements holding only text stay on one line
        if let [XmlNode::Text(text)] = self.children.as_slice() {
            return write!(formatter, ">{}</{}>", escape(text), self.name);
        }

        writeln!(formatter, ">")?;
        for child in &self.children {
            match child {
                XmlNode::Element(element) => element.write_indented(formatter, depth + 1)?,
                XmlNode::Text(text) => write!(formatter, "{}    {}", indent, escape(text))?,
            }
            writeln!(formatter)?;
        }
        write!(formatter, "{}</{}>", indent, self.name)
    }
}

impl fmt::Display for XmlElement {
    fn fmt(&self, formatter: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.write_indented(formatter, 0)
    }
}
