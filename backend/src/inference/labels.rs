/// Ordered mapping from model output index to class name. The order is
/// significant: entry i names the class behind output logit i.
#[derive(Debug, Clone)]
pub struct LabelTable {
    labels: Vec<String>,
}

impl LabelTable {
    pub fn new(labels: Vec<String>) -> Self {
        Self { labels }
    }

    pub fn len(&self) -> usize {
        self.labels.len()
    }

    pub fn is_empty(&self) -> bool {
        self.labels.is_empty()
    }

    pub fn get(&self, index: usize) -> Option<&str> {
        self.labels.get(index).map(String::as_str)
    }

    pub fn contains(&self, label: &str) -> bool {
        self.labels.iter().any(|l| l == label)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn table() -> LabelTable {
        LabelTable::new(vec!["cat".into(), "dog".into(), "bird".into()])
    }

    #[test]
    fn indexes_in_order() {
        let table = table();
        assert_eq!(table.len(), 3);
        assert_eq!(table.get(0), Some("cat"));
        assert_eq!(table.get(2), Some("bird"));
        assert_eq!(table.get(3), None);
    }

    #[test]
    fn membership() {
        let table = table();
        assert!(table.contains("dog"));
        assert!(!table.contains("fox"));
    }
}
