use polars::prelude::DataFrame;

/// A frame labelled with the source it was extracted from.
#[derive(Debug, Clone)]
pub struct Table {
    pub name: String,
    pub frame: DataFrame,
}

/// Source-ordered collection of named tables handed from stage to stage.
#[derive(Debug, Clone, Default)]
pub struct Tables {
    tables: Vec<Table>,
}

impl Tables {
    pub fn new() -> Self {
        Self::default()
    }

    /// Inserts a table, replacing an existing one of the same name in place.
    pub fn insert(&mut self, name: impl Into<String>, frame: DataFrame) {
        let name = name.into();
        match self.tables.iter_mut().find(|table| table.name == name) {
            Some(existing) => existing.frame = frame,
            None => self.tables.push(Table { name, frame }),
        }
    }

    pub fn get(&self, name: &str) -> Option<&DataFrame> {
        self.tables
            .iter()
            .find(|table| table.name == name)
            .map(|table| &table.frame)
    }

    pub fn names(&self) -> Vec<&str> {
        self.tables.iter().map(|table| table.name.as_str()).collect()
    }

    pub fn iter(&self) -> std::slice::Iter<'_, Table> {
        self.tables.iter()
    }

    pub fn len(&self) -> usize {
        self.tables.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tables.is_empty()
    }
}

impl IntoIterator for Tables {
    type Item = Table;
    type IntoIter = std::vec::IntoIter<Table>;

    fn into_iter(self) -> Self::IntoIter {
        self.tables.into_iter()
    }
}

impl<'a> IntoIterator for &'a Tables {
    type Item = &'a Table;
    type IntoIter = std::slice::Iter<'a, Table>;

    fn into_iter(self) -> Self::IntoIter {
        self.tables.iter()
    }
}
