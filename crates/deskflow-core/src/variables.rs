use indexmap::IndexMap;
use regex::{Captures, Regex};
use serde::{Deserialize, Serialize};
use std::sync::LazyLock;

static PLACEHOLDER: LazyLock<Option<Regex>> =
    LazyLock::new(|| Regex::new(r"\{\{(\w+)\}\}").ok());

/// Name to string mapping owned by a single flow run.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct VariableStore {
    values: IndexMap<String, String>,
}

impl VariableStore {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set(&mut self, name: &str, value: impl Into<String>) {
        if name.is_empty() {
            return;
        }
        self.values.insert(name.to_owned(), value.into());
    }

    pub fn get(&self, name: &str) -> Option<&str> {
        self.values.get(name).map(String::as_str)
    }

    pub fn remove(&mut self, name: &str) -> Option<String> {
        self.values.shift_remove(name)
    }

    pub fn contains(&self, name: &str) -> bool {
        self.values.contains_key(name)
    }

    pub fn len(&self) -> usize {
        self.values.len()
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &str)> {
        self.values.iter().map(|(k, v)| (k.as_str(), v.as_str()))
    }

    pub fn clear(&mut self) {
        self.values.clear();
    }

    /// Replaces every `{{name}}` with the current value of `name`. Unknown
    /// names are left as the literal token.
    pub fn interpolate(&self, text: &str) -> String {
        let Some(pattern) = PLACEHOLDER.as_ref() else {
            return text.to_owned();
        };
        if !text.contains("{{") {
            return text.to_owned();
        }

        pattern
            .replace_all(text, |caps: &Captures<'_>| {
                self.get(&caps[1])
                    .map_or_else(|| caps[0].to_owned(), str::to_owned)
            })
            .into_owned()
    }
}

impl<K: Into<String>, V: Into<String>> FromIterator<(K, V)> for VariableStore {
    fn from_iter<T: IntoIterator<Item = (K, V)>>(iter: T) -> Self {
        Self {
            values: iter
                .into_iter()
                .map(|(k, v)| (k.into(), v.into()))
                .collect(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_interpolate_known_and_unknown() {
        let mut vars = VariableStore::new();
        vars.set("name", "World");

        assert_eq!(vars.interpolate("Hello {{name}}!"), "Hello World!");
        assert_eq!(vars.interpolate("{{missing}} stays"), "{{missing}} stays");
        assert_eq!(vars.interpolate("no tokens"), "no tokens");
    }

    #[test]
    fn test_interpolate_is_single_pass() {
        let mut vars = VariableStore::new();
        vars.set("a", "{{b}}");
        vars.set("b", "deep");

        assert_eq!(vars.interpolate("{{a}}"), "{{b}}");
    }

    #[test]
    fn test_interpolate_ignores_non_word_names() {
        let mut vars = VariableStore::new();
        vars.set("x", "1");

        assert_eq!(vars.interpolate("{{ x }} {{x-y}} {{x}}"), "{{ x }} {{x-y}} 1");
    }

    #[test]
    fn test_empty_name_is_ignored() {
        let mut vars = VariableStore::new();
        vars.set("", "value");
        assert!(vars.is_empty());
    }

    #[test]
    fn test_iteration_keeps_insertion_order() {
        let vars: VariableStore = [("b", "2"), ("a", "1")].into_iter().collect();
        let names: Vec<_> = vars.iter().map(|(k, _)| k).collect();
        assert_eq!(names, ["b", "a"]);
    }
}
