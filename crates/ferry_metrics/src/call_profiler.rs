//! Per-section timings for calls crossing the bridge

use std::collections::HashMap;
use std::time::Duration;

/// Accumulated timing for one named section.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SectionStats {
    pub calls: u64,
    pub total: Duration,
}

/// Records begin/end section timings.
///
/// The caller measures the section and reports the elapsed time afterwards.
/// The profiler must not stay borrowed while a section runs: sections may
/// reenter the bridge.
#[derive(Debug, Default)]
pub struct CallProfiler {
    sections: HashMap<String, SectionStats>,
}

impl CallProfiler {
    pub fn new() -> Self {
        Self {
            sections: HashMap::new(),
        }
    }

    pub fn record(&mut self, name: &str, elapsed: Duration) {
        let stats = self.sections.entry(name.to_string()).or_default();
        stats.calls += 1;
        stats.total += elapsed;
    }

    pub fn stats(&self, name: &str) -> SectionStats {
        self.sections.get(name).copied().unwrap_or_default()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_sections_accumulate() {
        let mut profiler = CallProfiler::new();
        profiler.record("Logger.log()", Duration::from_micros(10));
        profiler.record("Logger.log()", Duration::from_micros(30));

        let stats = profiler.stats("Logger.log()");
        assert_eq!(stats.calls, 2);
        assert_eq!(stats.total, Duration::from_micros(40));
        assert_eq!(profiler.stats("missing"), SectionStats::default());
    }
}
