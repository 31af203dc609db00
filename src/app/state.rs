//! Application lifecycle states and the legality of transitions between
//! them.

/// Lifecycle state of an [`crate::app::App`].
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, serde::Serialize, serde::Deserialize)]
#[repr(u32)]
pub enum AppState {
    /// Nothing is known yet, or the app was reset.
    Unknown = 0,
    /// Present on the system.
    Installed,
    /// Installable from a configured source.
    Available,
    /// Installable from a local file.
    AvailableLocal,
    /// Installed with an update pending that needs a restart.
    Updatable,
    /// Installed with an update that can be applied live.
    UpdatableLive,
    /// Install in progress.
    Installing,
    /// Payload download in progress.
    Downloading,
    /// Removal in progress.
    Removing,
    /// Waiting for favorable network conditions before installing.
    QueuedForInstall,
    /// Known but not obtainable (e.g. source disabled).
    Unavailable,
    /// Installed on disk, effective after reboot.
    PendingInstall,
    /// Removed on disk, effective after reboot.
    PendingRemove,
    /// Purchase flow in progress.
    Purchasing,
}

impl AppState {
    /// Number of variants; used by the atomic round-trip.
    pub(crate) const COUNT: u32 = 14;

    /// Decode the atomic representation.
    pub(crate) fn from_u32(v: u32) -> Self {
        match v {
            1 => AppState::Installed,
            2 => AppState::Available,
            3 => AppState::AvailableLocal,
            4 => AppState::Updatable,
            5 => AppState::UpdatableLive,
            6 => AppState::Installing,
            7 => AppState::Downloading,
            8 => AppState::Removing,
            9 => AppState::QueuedForInstall,
            10 => AppState::Unavailable,
            11 => AppState::PendingInstall,
            12 => AppState::PendingRemove,
            13 => AppState::Purchasing,
            _ => AppState::Unknown,
        }
    }

    /// Stable lower-case identifier for logs.
    pub fn as_str(self) -> &'static str {
        match self {
            AppState::Unknown => "unknown",
            AppState::Installed => "installed",
            AppState::Available => "available",
            AppState::AvailableLocal => "available-local",
            AppState::Updatable => "updatable",
            AppState::UpdatableLive => "updatable-live",
            AppState::Installing => "installing",
            AppState::Downloading => "downloading",
            AppState::Removing => "removing",
            AppState::QueuedForInstall => "queued-for-install",
            AppState::Unavailable => "unavailable",
            AppState::PendingInstall => "pending-install",
            AppState::PendingRemove => "pending-remove",
            AppState::Purchasing => "purchasing",
        }
    }

    /// Whether the state is transient, i.e. an operation is in flight and
    /// the previous stable state should be remembered for recovery.
    pub fn is_transient(self) -> bool {
        matches!(
            self,
            AppState::Installing
                | AppState::Downloading
                | AppState::Removing
                | AppState::Purchasing
                | AppState::QueuedForInstall
        )
    }

    /// Whether the app is on the system in some form.
    pub fn is_installed(self) -> bool {
        matches!(
            self,
            AppState::Installed
                | AppState::Updatable
                | AppState::UpdatableLive
                | AppState::PendingRemove
        )
    }

    /// Whether an update can be applied from this state.
    pub fn is_updatable(self) -> bool {
        matches!(self, AppState::Updatable | AppState::UpdatableLive)
    }
}

impl std::fmt::Display for AppState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Whether a direct transition between two states is legal.
///
/// Resetting to `Unknown` and parking in `Unavailable` are always allowed;
/// everything else follows the lifecycle: available-ish states enter
/// `Installing`/`Downloading`/`QueuedForInstall`, installed-ish states
/// enter `Removing` or become updatable, transient states land on their
/// outcome.
pub fn transition_allowed(from: AppState, to: AppState) -> bool {
    use AppState as S;
    if from == to || to == S::Unknown || to == S::Unavailable || from == S::Unknown {
        return true;
    }
    matches!(
        (from, to),
        (S::Available, S::Installing | S::Downloading | S::QueuedForInstall | S::Purchasing)
            | (S::AvailableLocal, S::Installing)
            | (S::QueuedForInstall, S::Installing | S::Available)
            | (S::Installed, S::Removing | S::Updatable | S::UpdatableLive | S::Downloading)
            | (S::Installing, S::Installed | S::PendingInstall)
            | (S::Downloading, S::Available | S::Installed | S::Updatable | S::UpdatableLive)
            | (S::Removing, S::PendingRemove | S::Installed)
            | (S::Updatable, S::Installing | S::Downloading | S::Removing)
            | (S::UpdatableLive, S::Installing | S::Downloading | S::Removing)
            | (S::Purchasing, S::Available | S::Installed)
            | (S::PendingInstall, S::Installed)
            | (S::PendingRemove, S::Installed)
            | (S::Unavailable, S::Available | S::AvailableLocal | S::Installed)
    )
}

/// Quality rank for textual fields; higher-quality sources may overwrite
/// lower ones but never the reverse.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, PartialOrd, Ord)]
pub enum Quality {
    /// Synthesized or guessed value.
    #[default]
    Lowest,
    /// Regular metadata value.
    Normal,
    /// Authoritative value.
    Highest,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn atomic_round_trip_covers_all_states() {
        for v in 0..AppState::COUNT {
            assert_eq!(AppState::from_u32(v) as u32, v);
        }
    }

    #[test]
    fn install_path_is_legal() {
        assert!(transition_allowed(AppState::Unknown, AppState::Available));
        assert!(transition_allowed(AppState::Available, AppState::Installing));
        assert!(transition_allowed(AppState::Installing, AppState::Installed));
    }

    #[test]
    fn queued_path_is_legal() {
        assert!(transition_allowed(AppState::Available, AppState::QueuedForInstall));
        assert!(transition_allowed(AppState::QueuedForInstall, AppState::Installing));
        assert!(transition_allowed(AppState::QueuedForInstall, AppState::Available));
    }

    #[test]
    fn skipping_transient_states_is_illegal() {
        assert!(!transition_allowed(AppState::Available, AppState::Installed));
        assert!(!transition_allowed(AppState::Installed, AppState::Available));
        assert!(!transition_allowed(AppState::Removing, AppState::Available));
    }

    #[test]
    fn anything_can_become_unavailable() {
        assert!(transition_allowed(AppState::Installing, AppState::Unavailable));
        assert!(transition_allowed(AppState::Installed, AppState::Unavailable));
    }

    #[test]
    fn quality_orders() {
        assert!(Quality::Highest > Quality::Normal);
        assert!(Quality::Normal > Quality::Lowest);
    }
}
