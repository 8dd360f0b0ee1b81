use std::collections::BTreeMap;

/// Response header map.
///
/// Names are case-sensitive and render in ascending lexical order, so an
/// emitted header block is deterministic for a given set of writes.
/// Writing a name twice keeps the last value; [`remove`](Self::remove)
/// is how a header is deleted. Values are expected to be ASCII per the
/// wire format; they are emitted byte for byte.
#[derive(Debug, Default, Clone)]
pub struct Headers {
    map: BTreeMap<String, String>,
}

impl Headers {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get(&self, name: &str) -> Option<&str> {
        self.map.get(name).map(String::as_str)
    }

    pub fn set(&mut self, name: impl Into<String>, value: impl Into<String>) {
        self.map.insert(name.into(), value.into());
    }

    pub fn remove(&mut self, name: &str) -> Option<String> {
        self.map.remove(name)
    }

    pub fn contains(&self, name: &str) -> bool {
        self.map.contains_key(name)
    }

    pub fn len(&self) -> usize {
        self.map.len()
    }

    pub fn is_empty(&self) -> bool {
        self.map.is_empty()
    }

    /// Headers in rendering order: ascending by name.
    pub fn iter(&self) -> impl Iterator<Item = (&str, &str)> {
        self.map.iter().map(|(k, v)| (k.as_str(), v.as_str()))
    }

    pub fn keys(&self) -> impl Iterator<Item = &str> {
        self.map.keys().map(String::as_str)
    }

    /// Parsed `Content-Length`; `None` when absent or unparsable.
    pub fn content_length(&self) -> Option<u64> {
        self.get("Content-Length")?.parse().ok()
    }

    /// Sets or removes `Content-Length`.
    pub fn set_content_length(&mut self, len: Option<u64>) {
        match len {
            Some(n) => self.set("Content-Length", n.to_string()),
            None => {
                self.remove("Content-Length");
            }
        }
    }

    pub fn content_type(&self) -> Option<&str> {
        self.get("Content-Type")
    }

    pub fn content_encoding(&self) -> Option<&str> {
        self.get("Content-Encoding")
    }

    pub fn transfer_encoding(&self) -> Option<&str> {
        self.get("Transfer-Encoding")
    }

    pub fn connection(&self) -> Option<&str> {
        self.get("Connection")
    }

    pub fn location(&self) -> Option<&str> {
        self.get("Location")
    }

    /// Whether `Transfer-Encoding` mentions chunked.
    pub fn is_chunked(&self) -> bool {
        self.transfer_encoding().is_some_and(|t| t.contains("chunked"))
    }

    /// Whether `Connection` equals keep-alive, compared without case.
    pub fn keep_alive(&self) -> bool {
        self.connection().is_some_and(|c| c.eq_ignore_ascii_case("keep-alive"))
    }

    /// Writes `Connection: Keep-Alive` or `Connection: close`.
    pub fn set_keep_alive(&mut self, on: bool) {
        self.set("Connection", if on { "Keep-Alive" } else { "close" });
    }
}

impl<'a> IntoIterator for &'a Headers {
    type Item = (&'a str, &'a str);
    type IntoIter = std::iter::Map<
        std::collections::btree_map::Iter<'a, String, String>,
        fn((&'a String, &'a String)) -> (&'a str, &'a str),
    >;

    fn into_iter(self) -> Self::IntoIter {
        fn deref<'b>((name, value): (&'b String, &'b String)) -> (&'b str, &'b str) {
            (name.as_str(), value.as_str())
        }
        self.map.iter().map(deref)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn last_write_wins() {
        let mut headers = Headers::new();
        headers.set("Content-Type", "text/plain");
        headers.set("Content-Type", "text/html");
        assert_eq!(headers.get("Content-Type"), Some("text/html"));
        assert_eq!(headers.len(), 1);
    }

    #[test]
    fn names_are_case_sensitive() {
        let mut headers = Headers::new();
        headers.set("content-type", "a");
        headers.set("Content-Type", "b");
        assert_eq!(headers.len(), 2);
        assert_eq!(headers.get("content-type"), Some("a"));
    }

    #[test]
    fn iteration_is_ascending_by_name() {
        let mut headers = Headers::new();
        headers.set("Server", "emit");
        headers.set("Content-Length", "0");
        headers.set("Connection", "close");
        let names: Vec<_> = headers.keys().collect();
        assert_eq!(names, ["Connection", "Content-Length", "Server"]);
    }

    #[test]
    fn remove_deletes() {
        let mut headers = Headers::new();
        headers.set("Location", "/");
        assert_eq!(headers.remove("Location"), Some("/".to_string()));
        assert!(!headers.contains("Location"));
        assert_eq!(headers.remove("Location"), None);
    }

    #[test]
    fn content_length_parses_or_ignores() {
        let mut headers = Headers::new();
        assert_eq!(headers.content_length(), None);
        headers.set_content_length(Some(42));
        assert_eq!(headers.content_length(), Some(42));
        headers.set("Content-Length", "junk");
        assert_eq!(headers.content_length(), None);
        headers.set_content_length(None);
        assert!(!headers.contains("Content-Length"));
    }

    #[test]
    fn keep_alive_compares_without_case() {
        let mut headers = Headers::new();
        assert!(!headers.keep_alive());
        headers.set("Connection", "keep-ALIVE");
        assert!(headers.keep_alive());
        headers.set_keep_alive(false);
        assert_eq!(headers.connection(), Some("close"));
        headers.set_keep_alive(true);
        assert_eq!(headers.connection(), Some("Keep-Alive"));
    }

    #[test]
    fn chunked_is_a_containment_check() {
        let mut headers = Headers::new();
        assert!(!headers.is_chunked());
        headers.set("Transfer-Encoding", "gzip, chunked");
        assert!(headers.is_chunked());
    }
}
