use std::fmt;

/// Identity under which a consumer reads and owns pending entries
///
/// Built once as `<prefix>-<hostname>-<pid>` and never changed afterwards.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct ConsumerIdentity(String);

impl ConsumerIdentity {
    /// Identity for this process, using the local host name and process id
    pub fn new(prefix: &str) -> Self {
        let hostname = sysinfo::System::host_name()
            .filter(|h| !h.is_empty())
            .unwrap_or_else(|| "unknown".to_string());

        Self::from_parts(prefix, &hostname, std::process::id())
    }

    /// Identity from explicit parts
    pub fn from_parts(prefix: &str, hostname: &str, pid: u32) -> Self {
        Self(format!("{}-{}-{}", prefix, hostname, pid))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for ConsumerIdentity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl AsRef<str> for ConsumerIdentity {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

impl PartialEq<str> for ConsumerIdentity {
    fn eq(&self, other: &str) -> bool {
        self.0 == other
    }
}
