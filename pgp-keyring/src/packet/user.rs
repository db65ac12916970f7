use std::fmt;

/// User id packet: opaque bytes, conventionally UTF-8 "Name <email>".
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct UserId {
    value: Vec<u8>,
}

impl UserId {
    pub fn new(value: impl Into<Vec<u8>>) -> Self {
        Self {
            value: value.into(),
        }
    }

    pub fn value(&self) -> &[u8] {
        &self.value
    }

    /// Lossy UTF-8 rendering for logs and display.
    pub fn to_string_lossy(&self) -> String {
        String::from_utf8_lossy(&self.value).into_owned()
    }
}

impl From<&str> for UserId {
    fn from(value: &str) -> Self {
        UserId::new(value.as_bytes())
    }
}

impl fmt::Display for UserId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", String::from_utf8_lossy(&self.value))
    }
}

/// User attribute packet (e.g. photo id), kept as opaque subpacket data.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct UserAttribute {
    data: Vec<u8>,
}

impl UserAttribute {
    pub fn new(data: Vec<u8>) -> Self {
        Self { data }
    }

    pub fn data(&self) -> &[u8] {
        &self.data
    }
}
