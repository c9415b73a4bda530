//! The stdout race report.
//!
//! Grounded on `original_source/lib/RaceDetector.cpp`'s `DumpFaults`: a
//! header with the race count, then one section per unordered task pair
//! listing the conflicting path accesses, substituting `!main` wherever a
//! side of the conflict carries no debug annotation.

use std::collections::BTreeMap;
use std::fmt::Write as _;

use fsracer_core::detector::Fault;
use fsracer_core::trace::AccessType;

fn access_str(access: AccessType) -> &'static str {
    match access {
        AccessType::Consumed => "consumed",
        AccessType::Produced => "produced",
        AccessType::Touched => "touched",
        AccessType::Expunged => "expunged",
    }
}

fn debug_or_main(debug: &Option<String>) -> &str {
    debug.as_deref().unwrap_or("main")
}

/// Renders the detected faults as the textual race report.
#[must_use]
pub fn render(faults: &[Fault]) -> String {
    let mut out = String::new();
    let _ = writeln!(out, "{} race(s) detected", faults.len());
    if faults.is_empty() {
        return out;
    }

    let mut by_pair: BTreeMap<(String, String), Vec<&Fault>> = BTreeMap::new();
    for fault in faults {
        let key = if fault.task1 <= fault.task2 {
            (fault.task1.clone(), fault.task2.clone())
        } else {
            (fault.task2.clone(), fault.task1.clone())
        };
        by_pair.entry(key).or_default().push(fault);
    }

    for ((t1, t2), items) in by_pair {
        let _ = writeln!(out, "\n{t1} <-> {t2}");
        for fault in items {
            let _ = writeln!(
                out,
                "  {}: {} [{}] {} vs {} [{}] {}",
                fault.path.display(),
                fault.task1,
                debug_or_main(&fault.debug1),
                access_str(fault.access1),
                fault.task2,
                debug_or_main(&fault.debug2),
                access_str(fault.access2),
            );
        }
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::path::PathBuf;

    #[test]
    fn empty_faults_report_zero_races() {
        assert_eq!(render(&[]), "0 race(s) detected\n");
    }

    #[test]
    fn missing_debug_tag_renders_as_main() {
        let faults = vec![Fault {
            path: PathBuf::from("/tmp/x"),
            task1: "a".to_string(),
            access1: AccessType::Produced,
            debug1: None,
            task2: "b".to_string(),
            access2: AccessType::Consumed,
            debug2: None,
        }];
        let report = render(&faults);
        assert!(report.contains("1 race(s) detected"));
        assert!(report.contains("[main]"));
    }
}
