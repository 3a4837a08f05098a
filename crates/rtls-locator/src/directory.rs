use std::collections::BTreeMap;
use std::sync::Arc;

/// Maps reader ids to the human-readable name of the area they cover.
pub trait LocationDirectory: Send + Sync {
    fn location_name(&self, reader_id: &str) -> Option<String>;
}

#[derive(Debug, Clone, Default)]
pub struct StaticDirectory {
    names: BTreeMap<String, String>,
}

impl StaticDirectory {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&mut self, reader_id: impl Into<String>, location_name: impl Into<String>) {
        self.names.insert(reader_id.into(), location_name.into());
    }

    pub fn len(&self) -> usize {
        self.names.len()
    }

    pub fn is_empty(&self) -> bool {
        self.names.is_empty()
    }
}

impl<K, V> FromIterator<(K, V)> for StaticDirectory
where
    K: Into<String>,
    V: Into<String>,
{
    fn from_iter<I: IntoIterator<Item = (K, V)>>(iter: I) -> Self {
        let mut directory = Self::new();
        for (reader_id, location_name) in iter {
            directory.insert(reader_id, location_name);
        }
        directory
    }
}

impl LocationDirectory for StaticDirectory {
    fn location_name(&self, reader_id: &str) -> Option<String> {
        self.names.get(reader_id).cloned()
    }
}

impl<D> LocationDirectory for Arc<D>
where
    D: LocationDirectory + ?Sized,
{
    fn location_name(&self, reader_id: &str) -> Option<String> {
        (**self).location_name(reader_id)
    }
}

/// Asks `primary` first and falls back to `fallback`.
#[derive(Debug, Clone)]
pub struct LayeredDirectory<P, F> {
    primary: P,
    fallback: F,
}

impl<P, F> LayeredDirectory<P, F> {
    pub fn new(primary: P, fallback: F) -> Self {
        Self { primary, fallback }
    }
}

impl<P, F> LocationDirectory for LayeredDirectory<P, F>
where
    P: LocationDirectory,
    F: LocationDirectory,
{
    fn location_name(&self, reader_id: &str) -> Option<String> {
        self.primary
            .location_name(reader_id)
            .or_else(|| self.fallback.location_name(reader_id))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn static_directory_resolves_known_readers_only() {
        let directory: StaticDirectory = [("M501", "M501호"), ("M502", "M502호")]
            .into_iter()
            .collect();
        assert_eq!(directory.len(), 2);
        assert_eq!(directory.location_name("M501").as_deref(), Some("M501호"));
        assert_eq!(directory.location_name("M777"), None);
    }

    #[test]
    fn layered_directory_prefers_primary() {
        let primary: StaticDirectory = [("M501", "Ward 5 east")].into_iter().collect();
        let fallback: StaticDirectory = [("M501", "M501호"), ("M502", "M502호")]
            .into_iter()
            .collect();
        let layered = LayeredDirectory::new(primary, fallback);

        assert_eq!(
            layered.location_name("M501").as_deref(),
            Some("Ward 5 east")
        );
        assert_eq!(layered.location_name("M502").as_deref(), Some("M502호"));
        assert_eq!(layered.location_name("M503"), None);
    }

    #[test]
    fn shared_directory_answers_through_the_arc() {
        let shared = Arc::new(StaticDirectory::from_iter([("M501", "Ward 5 east")]));
        let layered = LayeredDirectory::new(Arc::clone(&shared), StaticDirectory::new());
        assert_eq!(
            layered.location_name("M501").as_deref(),
            Some("Ward 5 east")
        );
        assert_eq!(shared.location_name("M502"), None);
    }
}
