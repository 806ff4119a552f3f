// libs/appointment-cell/src/services/catalog.rs
use std::collections::HashMap;
use std::fmt;

use chrono::{NaiveDate, NaiveTime};
use serde::{Deserialize, Serialize};
use tracing::debug;

use shared_config::AppConfig;

use crate::services::interval::TimeInterval;

/// Duration used for labels the catalog does not know.
pub const FALLBACK_DURATION_MINUTES: i64 = 30;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AppointmentKind {
    GeneralConsultation,
    Vaccination,
    Emergency,
    Surgery,
    Grooming,
    Checkup,
    Deworming,
}

impl AppointmentKind {
    pub const ALL: [AppointmentKind; 7] = [
        AppointmentKind::GeneralConsultation,
        AppointmentKind::Vaccination,
        AppointmentKind::Emergency,
        AppointmentKind::Surgery,
        AppointmentKind::Grooming,
        AppointmentKind::Checkup,
        AppointmentKind::Deworming,
    ];

    pub fn label(&self) -> &'static str {
        match self {
            AppointmentKind::GeneralConsultation => "general_consultation",
            AppointmentKind::Vaccination => "vaccination",
            AppointmentKind::Emergency => "emergency",
            AppointmentKind::Surgery => "surgery",
            AppointmentKind::Grooming => "grooming",
            AppointmentKind::Checkup => "checkup",
            AppointmentKind::Deworming => "deworming",
        }
    }

    /// Case-insensitive match; spaces and hyphens are treated as underscores,
    /// so "General Consultation" and "general-consultation" both resolve.
    pub fn from_label(label: &str) -> Option<Self> {
        let normalized: String = label
            .trim()
            .chars()
            .map(|c| match c {
                ' ' | '-' => '_',
                other => other.to_ascii_lowercase(),
            })
            .collect();

        AppointmentKind::ALL
            .into_iter()
            .find(|kind| kind.label() == normalized)
    }
}

impl fmt::Display for AppointmentKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

/// Clinic-wide absolute opening hours.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ClinicHours {
    pub open: NaiveTime,
    pub close: NaiveTime,
}

impl ClinicHours {
    pub fn new(open: NaiveTime, close: NaiveTime) -> Self {
        Self { open, close }
    }

    pub fn from_config(config: &AppConfig) -> Self {
        Self::new(config.clinic_open, config.clinic_close)
    }

    pub fn as_window(&self) -> Option<OperatingWindow> {
        OperatingWindow::new(self.open, self.close)
    }
}

/// A time-of-day interval `[open, close)` during which a type may be booked.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
pub struct OperatingWindow {
    pub open: NaiveTime,
    pub close: NaiveTime,
}

impl OperatingWindow {
    /// `None` when the window would be empty.
    pub fn new(open: NaiveTime, close: NaiveTime) -> Option<Self> {
        (open < close).then_some(Self { open, close })
    }

    fn hm(open: (u32, u32), close: (u32, u32)) -> Option<Self> {
        Self::new(
            NaiveTime::from_hms_opt(open.0, open.1, 0)?,
            NaiveTime::from_hms_opt(close.0, close.1, 0)?,
        )
    }

    /// Intersection with the clinic's hours, if any remains.
    pub fn clip(&self, clinic: &ClinicHours) -> Option<Self> {
        Self::new(self.open.max(clinic.open), self.close.min(clinic.close))
    }

    /// The window placed on a calendar day, in UTC.
    pub fn on(&self, date: NaiveDate) -> TimeInterval {
        TimeInterval::new(date.and_time(self.open).and_utc(), date.and_time(self.close).and_utc())
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AppointmentProfile {
    pub kind: Option<AppointmentKind>,
    pub duration_minutes: i64,
    pub windows: Vec<OperatingWindow>,
}

/// Immutable table of appointment-type profiles, built once at startup.
#[derive(Debug, Clone)]
pub struct AppointmentTypeCatalog {
    clinic: ClinicHours,
    profiles: HashMap<AppointmentKind, AppointmentProfile>,
    fallback: AppointmentProfile,
}

impl AppointmentTypeCatalog {
    /// The clinic's standard profiles, with every window clipped to `clinic`.
    pub fn standard(clinic: ClinicHours) -> Self {
        let full_day: Vec<OperatingWindow> = clinic.as_window().into_iter().collect();
        let split_day: Vec<OperatingWindow> = [
            OperatingWindow::hm((8, 0), (12, 30)),
            OperatingWindow::hm((14, 0), (17, 0)),
        ]
        .into_iter()
        .flatten()
        .collect();

        let table: Vec<(AppointmentKind, i64, Vec<OperatingWindow>)> = vec![
            (AppointmentKind::GeneralConsultation, 30, full_day.clone()),
            (AppointmentKind::Vaccination, 20, split_day.clone()),
            (AppointmentKind::Emergency, 60, full_day.clone()),
            (
                AppointmentKind::Surgery,
                120,
                OperatingWindow::hm((8, 0), (12, 0)).into_iter().collect(),
            ),
            (
                AppointmentKind::Grooming,
                45,
                [
                    OperatingWindow::hm((9, 0), (12, 0)),
                    OperatingWindow::hm((13, 0), (16, 0)),
                ]
                .into_iter()
                .flatten()
                .collect(),
            ),
            (AppointmentKind::Checkup, 20, split_day.clone()),
            (AppointmentKind::Deworming, 15, split_day),
        ];

        let profiles = table
            .into_iter()
            .map(|(kind, duration_minutes, windows)| {
                let profile = AppointmentProfile {
                    kind: Some(kind),
                    duration_minutes,
                    windows: clip_all(&windows, &clinic),
                };
                (kind, profile)
            })
            .collect();

        Self {
            clinic,
            profiles,
            fallback: AppointmentProfile {
                kind: None,
                duration_minutes: FALLBACK_DURATION_MINUTES,
                windows: full_day,
            },
        }
    }

    pub fn from_config(config: &AppConfig) -> Self {
        Self::standard(ClinicHours::from_config(config))
    }

    pub fn clinic_hours(&self) -> ClinicHours {
        self.clinic
    }

    /// Resolves a free-form label; unknown labels get the fallback profile.
    pub fn profile_for(&self, appointment_type: &str) -> &AppointmentProfile {
        match AppointmentKind::from_label(appointment_type).and_then(|kind| self.profiles.get(&kind)) {
            Some(profile) => profile,
            None => {
                debug!("Unknown appointment type '{}', using fallback profile", appointment_type);
                &self.fallback
            }
        }
    }

    pub fn duration_for(&self, appointment_type: &str) -> i64 {
        self.profile_for(appointment_type).duration_minutes
    }

    /// Operating windows for the type, clipped to clinic hours and ordered by opening time.
    pub fn windows_for(&self, appointment_type: &str) -> &[OperatingWindow] {
        &self.profile_for(appointment_type).windows
    }
}

fn clip_all(windows: &[OperatingWindow], clinic: &ClinicHours) -> Vec<OperatingWindow> {
    let mut clipped: Vec<OperatingWindow> = windows.iter().filter_map(|w| w.clip(clinic)).collect();
    clipped.sort();
    clipped
}

#[cfg(test)]
mod tests {
    use super::*;

    fn t(h: u32, m: u32) -> NaiveTime {
        NaiveTime::from_hms_opt(h, m, 0).unwrap()
    }

    fn catalog() -> AppointmentTypeCatalog {
        AppointmentTypeCatalog::standard(ClinicHours::new(t(7, 0), t(17, 0)))
    }

    #[test]
    fn known_durations() {
        let catalog = catalog();
        assert_eq!(catalog.duration_for("general_consultation"), 30);
        assert_eq!(catalog.duration_for("vaccination"), 20);
        assert_eq!(catalog.duration_for("emergency"), 60);
        assert_eq!(catalog.duration_for("surgery"), 120);
        assert_eq!(catalog.duration_for("grooming"), 45);
        assert_eq!(catalog.duration_for("checkup"), 20);
        assert_eq!(catalog.duration_for("deworming"), 15);
    }

    #[test]
    fn labels_match_case_insensitively() {
        let catalog = catalog();
        assert_eq!(catalog.duration_for("VACCINATION"), 20);
        assert_eq!(catalog.duration_for("General Consultation"), 30);
        assert_eq!(AppointmentKind::from_label(" Surgery "), Some(AppointmentKind::Surgery));
    }

    #[test]
    fn unknown_type_falls_back_to_full_clinic_day() {
        let catalog = catalog();
        assert_eq!(catalog.duration_for("acupuncture"), FALLBACK_DURATION_MINUTES);
        assert_eq!(catalog.windows_for("acupuncture"), &[OperatingWindow::new(t(7, 0), t(17, 0)).unwrap()]);
        assert_eq!(catalog.profile_for("").kind, None);
    }

    #[test]
    fn vaccination_is_split_around_lunch() {
        let windows = catalog().windows_for("vaccination").to_vec();
        assert_eq!(
            windows,
            vec![
                OperatingWindow::new(t(8, 0), t(12, 30)).unwrap(),
                OperatingWindow::new(t(14, 0), t(17, 0)).unwrap(),
            ]
        );
    }

    #[test]
    fn windows_are_clipped_to_clinic_hours() {
        let short_day = AppointmentTypeCatalog::standard(ClinicHours::new(t(9, 0), t(15, 0)));

        assert_eq!(
            short_day.windows_for("vaccination"),
            &[
                OperatingWindow::new(t(9, 0), t(12, 30)).unwrap(),
                OperatingWindow::new(t(14, 0), t(15, 0)).unwrap(),
            ]
        );
        assert_eq!(short_day.windows_for("surgery"), &[OperatingWindow::new(t(9, 0), t(12, 0)).unwrap()]);
    }

    #[test]
    fn windows_outside_clinic_hours_disappear() {
        let afternoon_only = AppointmentTypeCatalog::standard(ClinicHours::new(t(13, 0), t(17, 0)));
        assert!(afternoon_only.windows_for("surgery").is_empty());
    }

    #[test]
    fn empty_window_is_rejected() {
        assert_eq!(OperatingWindow::new(t(10, 0), t(10, 0)), None);
        assert_eq!(OperatingWindow::new(t(11, 0), t(10, 0)), None);
    }
}
