//! Text rendering of durations and project totals.

use std::fmt;

use crate::storage::{ProjectTotals, SessionRecord};

/// Zero-padded `HH:MM:SS`. Hours keep growing past 99.
pub fn format_hms(seconds: u64) -> String {
    let (m, s) = (seconds / 60, seconds % 60);
    let (h, m) = (m / 60, m % 60);
    format!("{h:02}:{m:02}:{s:02}")
}

impl fmt::Display for ProjectTotals {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{}. {}: total {}, this week {}",
            self.id,
            self.name,
            format_hms(self.total_secs),
            format_hms(self.week_secs)
        )
    }
}

impl fmt::Display for SessionRecord {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} {:<5} {} {}",
            self.started_at
                .with_timezone(&chrono::Local)
                .format("%Y-%m-%d %H:%M"),
            self.step_type.as_str(),
            format_hms(self.duration_secs),
            self.project_name
        )
    }
}

/// The listing shown by `list` and on shell entry.
pub fn render_project_list(projects: &[ProjectTotals]) -> String {
    if projects.is_empty() {
        return "No active projects.".to_string();
    }
    let mut out = String::from("Active projects:");
    for project in projects {
        out.push_str("\n- ");
        out.push_str(&project.to_string());
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    #[test]
    fn formats_hours_minutes_seconds() {
        assert_eq!(format_hms(0), "00:00:00");
        assert_eq!(format_hms(59), "00:00:59");
        assert_eq!(format_hms(3725), "01:02:05");
        assert_eq!(format_hms(100 * 3600), "100:00:00");
    }

    #[test]
    fn renders_project_lines() {
        let projects = vec![ProjectTotals {
            id: 3,
            name: "Writing".into(),
            total_secs: 3725,
            week_secs: 1500,
        }];
        assert_eq!(
            render_project_list(&projects),
            "Active projects:\n- 3. Writing: total 01:02:05, this week 00:25:00"
        );
        assert_eq!(render_project_list(&[]), "No active projects.");
    }

    proptest! {
        #[test]
        fn hms_fields_recompose(secs in 0u64..10_000_000) {
            let text = format_hms(secs);
            let parts: Vec<u64> = text.split(':').map(|p| p.parse().unwrap()).collect();
            prop_assert_eq!(parts.len(), 3);
            prop_assert!(parts[1] < 60 && parts[2] < 60);
            prop_assert_eq!(parts[0] * 3600 + parts[1] * 60 + parts[2], secs);
        }
    }
}
