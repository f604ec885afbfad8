//! Broker topic addressing.
//!
//! Every device listens on command topics and publishes on status topics that
//! are scoped by its normalized hardware address:
//!
//! ```text
//! esp/commands/booking/AABBCCDDEEFF     <- server publishes "book"
//! esp/status/AABBCCDDEEFF               -> device publishes "booked"
//! ```
//!
//! Addressing never fails. A missing or unusable address degrades to the bare
//! root topic, which the firmware treats as a broadcast.

const COMMAND_ROOT: &str = "esp/commands";
const STATUS_ROOT: &str = "esp/status";
const LOG_ROOT: &str = "esp/logs";
const BOOKING_STATUS_ROOT: &str = "esp/booking/status";
const MAINTENANCE_STATUS_ROOT: &str = "esp/maintenance/status";

/// Normalizes a raw hardware address.
///
/// Every character that is not a hex digit is dropped and the remainder is
/// uppercased. Returns `None` when nothing is left.
///
/// # Example
///
/// ```rust
/// use velolock_core::topics::normalize_mac;
///
/// assert_eq!(normalize_mac("aa:bb:cc").as_deref(), Some("AABBCC"));
/// assert_eq!(normalize_mac("--"), None);
/// ```
#[must_use]
pub fn normalize_mac(raw: &str) -> Option<String> {
    let mac: String = raw
        .chars()
        .filter(char::is_ascii_hexdigit)
        .map(|c| c.to_ascii_uppercase())
        .collect();

    if mac.is_empty() {
        None
    } else {
        Some(mac)
    }
}

/// Scopes a base topic to a device.
///
/// Returns `base` unchanged when `raw_mac` is `None` or normalizes to nothing.
/// Otherwise one trailing `/` is stripped from `base` and `/<MAC>` appended.
#[must_use]
pub fn topic_with_mac(base: &str, raw_mac: Option<&str>) -> String {
    let Some(mac) = raw_mac.and_then(normalize_mac) else {
        return base.to_string();
    };

    let base = base.strip_suffix('/').unwrap_or(base);
    format!("{base}/{mac}")
}

/// Returns `true` if `incoming` is `base` itself or a topic below it.
#[must_use]
pub fn matches_topic(incoming: &str, base: &str) -> bool {
    incoming == base
        || incoming
            .strip_prefix(base)
            .is_some_and(|rest| rest.starts_with('/'))
}

/// Topics the server publishes commands on.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum CommandTopic {
    /// `esp/commands`, accepts raw state labels.
    Root,
    /// `esp/commands/state`
    State,
    /// `esp/commands/booking`
    Booking,
    /// `esp/commands/maintenance`
    Maintenance,
    /// `esp/commands/reservation`
    Reservation,
    /// `esp/commands/status`
    Status,
}

impl CommandTopic {
    /// Returns the unscoped topic name.
    #[must_use]
    pub const fn base(self) -> &'static str {
        match self {
            Self::Root => COMMAND_ROOT,
            Self::State => "esp/commands/state",
            Self::Booking => "esp/commands/booking",
            Self::Maintenance => "esp/commands/maintenance",
            Self::Reservation => "esp/commands/reservation",
            Self::Status => "esp/commands/status",
        }
    }

    /// Returns the topic scoped to `mac`, or the bare topic if `mac` is unusable.
    #[must_use]
    pub fn for_device(self, mac: Option<&str>) -> String {
        topic_with_mac(self.base(), mac)
    }
}

/// Topics devices publish on.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum StatusTopic {
    /// `esp/status`: lifecycle labels and diagnostics.
    Status,
    /// `esp/logs`: free-form firmware log lines.
    Logs,
    /// `esp/booking/status`: `booked` / `available`.
    BookingStatus,
    /// `esp/maintenance/status`: `in_progress` / `completed`.
    MaintenanceStatus,
}

impl StatusTopic {
    /// All status topic roots.
    pub const ALL: [Self; 4] = [
        Self::Status,
        Self::Logs,
        Self::BookingStatus,
        Self::MaintenanceStatus,
    ];

    /// Returns the unscoped topic name.
    #[must_use]
    pub const fn base(self) -> &'static str {
        match self {
            Self::Status => STATUS_ROOT,
            Self::Logs => LOG_ROOT,
            Self::BookingStatus => BOOKING_STATUS_ROOT,
            Self::MaintenanceStatus => MAINTENANCE_STATUS_ROOT,
        }
    }

    /// Returns the topic scoped to `mac`, or the bare topic if `mac` is unusable.
    #[must_use]
    pub fn for_device(self, mac: Option<&str>) -> String {
        topic_with_mac(self.base(), mac)
    }

    /// Splits an incoming topic into its status root and device segment.
    ///
    /// The device segment is the first path segment after the root, or `None`
    /// for the bare root. Returns `None` for topics outside the status roots.
    #[must_use]
    pub fn classify(topic: &str) -> Option<(Self, Option<&str>)> {
        Self::ALL.into_iter().find_map(|root| {
            if !matches_topic(topic, root.base()) {
                return None;
            }

            let device = topic[root.base().len()..]
                .trim_start_matches('/')
                .split('/')
                .next()
                .filter(|segment| !segment.is_empty());

            Some((root, device))
        })
    }

    /// Subscription filters covering every status root, bare and per-device.
    #[must_use]
    pub fn subscription_filters() -> Vec<String> {
        Self::ALL
            .into_iter()
            .flat_map(|root| [root.base().to_string(), format!("{}/#", root.base())])
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_topic_without_mac_is_unchanged() {
        assert_eq!(
            topic_with_mac("esp/commands/state", None),
            "esp/commands/state"
        );
        assert_eq!(
            topic_with_mac("esp/commands/state", Some("")),
            "esp/commands/state"
        );
        assert_eq!(
            topic_with_mac("esp/commands/state", Some("::--zz")),
            "esp/commands/state"
        );
    }

    #[test]
    fn test_topic_with_mac_normalizes() {
        assert_eq!(
            topic_with_mac("esp/commands/state", Some("aa:bb:cc")),
            "esp/commands/state/AABBCC"
        );
        assert_eq!(
            topic_with_mac("esp/status", Some("aa-bb-cc-dd-ee-ff")),
            "esp/status/AABBCCDDEEFF"
        );
    }

    #[test]
    fn test_trailing_slash_collapsed() {
        assert_eq!(
            topic_with_mac("esp/commands/state/", Some("aabbcc")),
            "esp/commands/state/AABBCC"
        );
        // Only one slash is stripped.
        assert_eq!(
            topic_with_mac("esp/commands//", Some("aabbcc")),
            "esp/commands//AABBCC"
        );
    }

    #[test]
    fn test_normalize_mac() {
        assert_eq!(normalize_mac("aa:bb:cc:dd:ee:ff").as_deref(), Some("AABBCCDDEEFF"));
        assert_eq!(normalize_mac("bike-0042").as_deref(), Some("BE0042"));
        assert_eq!(normalize_mac(""), None);
        assert_eq!(normalize_mac("xyz"), None);
    }

    #[test]
    fn test_command_topics() {
        assert_eq!(CommandTopic::Root.base(), "esp/commands");
        assert_eq!(
            CommandTopic::Reservation.for_device(Some("aabbcc")),
            "esp/commands/reservation/AABBCC"
        );
        assert_eq!(CommandTopic::Status.for_device(None), "esp/commands/status");
    }

    #[test]
    fn test_matches_topic() {
        assert!(matches_topic("esp/status", "esp/status"));
        assert!(matches_topic("esp/status/AABB", "esp/status"));
        assert!(!matches_topic("esp/statuses", "esp/status"));
        assert!(!matches_topic("esp/booking/status", "esp/status"));
    }

    #[test]
    fn test_classify_status_topics() {
        assert_eq!(
            StatusTopic::classify("esp/status/AABBCC"),
            Some((StatusTopic::Status, Some("AABBCC")))
        );
        assert_eq!(
            StatusTopic::classify("esp/booking/status/AABBCC"),
            Some((StatusTopic::BookingStatus, Some("AABBCC")))
        );
        assert_eq!(
            StatusTopic::classify("esp/maintenance/status"),
            Some((StatusTopic::MaintenanceStatus, None))
        );
        assert_eq!(
            StatusTopic::classify("esp/logs/AABBCC/boot"),
            Some((StatusTopic::Logs, Some("AABBCC")))
        );
        assert_eq!(StatusTopic::classify("esp/commands/state/AABBCC"), None);
    }

    #[test]
    fn test_subscription_filters() {
        let filters = StatusTopic::subscription_filters();
        assert_eq!(filters.len(), 8);
        assert!(filters.contains(&"esp/status".to_string()));
        assert!(filters.contains(&"esp/maintenance/status/#".to_string()));
    }
}
