//! Named gauges for queue depth and event counts

use std::collections::HashMap;

#[derive(Debug, Default)]
pub struct Counter {
    counters: HashMap<String, usize>,
    high_water: HashMap<String, usize>,
}

impl Counter {
    pub fn new() -> Self {
        Self {
            counters: HashMap::new(),
            high_water: HashMap::new(),
        }
    }

    /// Overwrite a gauge with an absolute value.
    pub fn set(&mut self, name: &str, value: usize) {
        self.counters.insert(name.to_string(), value);
        self.note_high_water(name, value);
    }

    pub fn get(&self, name: &str) -> usize {
        self.counters.get(name).copied().unwrap_or(0)
    }

    /// Largest value a gauge has held since the last reset.
    pub fn high_water(&self, name: &str) -> usize {
        self.high_water.get(name).copied().unwrap_or(0)
    }

    pub fn reset(&mut self, name: &str) {
        self.counters.insert(name.to_string(), 0);
        self.high_water.remove(name);
    }

    pub fn iter(&self) -> impl Iterator<Item = (&String, &usize)> {
        self.counters.iter()
    }

    fn note_high_water(&mut self, name: &str, value: usize) {
        let mark = self.high_water.entry(name.to_string()).or_insert(0);
        if value > *mark {
            *mark = value;
        }
    }
}
