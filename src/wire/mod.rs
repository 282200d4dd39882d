//! Syslog wire-format encoding.
//!
//! The delivery engine treats encoded records as opaque byte strings; this
//! module supplies the default encoder producing RFC 3164 (BSD) or
//! RFC 5424 messages from a structured record. Hosts with their own
//! encoding pipeline can substitute any [`EncodeRecord`] implementation.

use std::fmt::Write as _;
use std::str::FromStr;

use chrono::{DateTime, Local};

use crate::core::error::ConfigError;

/// Log importance, ordered per syslog.h (lower value = more severe).
#[repr(u8)]
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub enum Severity {
    /// System is unusable.
    Emergency = 0,
    /// Action must be taken immediately.
    Alert = 1,
    /// Critical conditions.
    Critical = 2,
    /// Error conditions.
    Error = 3,
    /// Warning conditions.
    Warning = 4,
    /// Normal but significant condition.
    Notice = 5,
    /// Informational.
    Info = 6,
    /// Debug-level messages.
    Debug = 7,
}

impl Severity {
    /// Encode severity into a PRI value with the given facility.
    pub const fn priority(self, facility: Facility) -> u8 {
        facility as u8 | self as u8
    }

    /// The level keyword as written by logging front-ends.
    pub const fn keyword(self) -> &'static str {
        match self {
            Severity::Emergency => "emerg",
            Severity::Alert => "alert",
            Severity::Critical => "crit",
            Severity::Error => "error",
            Severity::Warning => "warning",
            Severity::Notice => "notice",
            Severity::Info => "info",
            Severity::Debug => "debug",
        }
    }
}

impl FromStr for Severity {
    type Err = UnknownLevel;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        // `err` is the syslog.h spelling, accepted as an alias.
        match s {
            "debug" => Ok(Severity::Debug),
            "info" => Ok(Severity::Info),
            "notice" => Ok(Severity::Notice),
            "warning" => Ok(Severity::Warning),
            "error" | "err" => Ok(Severity::Error),
            "crit" => Ok(Severity::Critical),
            "alert" => Ok(Severity::Alert),
            "emerg" => Ok(Severity::Emergency),
            other => Err(UnknownLevel(other.to_string())),
        }
    }
}

/// Raised when a level string is not one of the eight syslog severities.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("cannot log unknown syslog level: {0}")]
pub struct UnknownLevel(pub String);

/// Facility code indicating the source of a record.
#[repr(u8)]
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub enum Facility {
    /// Kernel messages.
    Kern = 0 << 3,
    /// User-space application (syslog default).
    User = 1 << 3,
    /// Mail system.
    Mail = 2 << 3,
    /// System daemons.
    Daemon = 3 << 3,
    /// Security / authorization.
    Auth = 4 << 3,
    /// Internal syslogd.
    Syslog = 5 << 3,
    /// Line printer subsystem.
    Lpr = 6 << 3,
    /// Network news.
    News = 7 << 3,
    /// UUCP subsystem.
    Uucp = 8 << 3,
    /// Cron daemon.
    Cron = 9 << 3,
    /// Security / authorization (private).
    Authpriv = 10 << 3,
    /// FTP daemon.
    Ftp = 11 << 3,
    /// Reserved for local use.
    Local0 = 16 << 3,
    /// Reserved for local use.
    Local1 = 17 << 3,
    /// Reserved for local use.
    Local2 = 18 << 3,
    /// Reserved for local use.
    Local3 = 19 << 3,
    /// Reserved for local use.
    Local4 = 20 << 3,
    /// Reserved for local use.
    Local5 = 21 << 3,
    /// Reserved for local use.
    Local6 = 22 << 3,
    /// Reserved for local use.
    Local7 = 23 << 3,
}

impl Default for Facility {
    fn default() -> Self {
        // The delivery client defaults to local0, not the syslog.h default
        // of user: collectors conventionally file application traffic there.
        Facility::Local0
    }
}

impl FromStr for Facility {
    type Err = ConfigError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "kern" => Ok(Facility::Kern),
            "user" => Ok(Facility::User),
            "mail" => Ok(Facility::Mail),
            "daemon" => Ok(Facility::Daemon),
            "auth" => Ok(Facility::Auth),
            "syslog" => Ok(Facility::Syslog),
            "lpr" => Ok(Facility::Lpr),
            "news" => Ok(Facility::News),
            "uucp" => Ok(Facility::Uucp),
            "cron" => Ok(Facility::Cron),
            "authpriv" => Ok(Facility::Authpriv),
            "ftp" => Ok(Facility::Ftp),
            "local0" => Ok(Facility::Local0),
            "local1" => Ok(Facility::Local1),
            "local2" => Ok(Facility::Local2),
            "local3" => Ok(Facility::Local3),
            "local4" => Ok(Facility::Local4),
            "local5" => Ok(Facility::Local5),
            "local6" => Ok(Facility::Local6),
            "local7" => Ok(Facility::Local7),
            other => Err(ConfigError::UnknownFacility(other.to_string())),
        }
    }
}

/// Wire format produced by the embedded encoder.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Default)]
pub enum SyslogFormat {
    /// RFC 3164 BSD-style messages (default).
    #[default]
    Bsd,
    /// RFC 5424 structured messages.
    Rfc5424,
}

/// A structured record ready for encoding.
///
/// The host logging front-end supplies severity and an already-formatted
/// message; the producer adds origin metadata and the wire header.
#[derive(Debug, Clone)]
pub struct Record<'a> {
    /// Record severity.
    pub severity: Severity,
    /// Record timestamp.
    pub timestamp: DateTime<Local>,
    /// Formatted message body.
    pub message: &'a str,
}

/// Encoder seam: turns a [`Record`] into a wire-ready string.
///
/// The delivery engine never inspects the output; it only measures and
/// transmits it.
pub trait EncodeRecord: Send + Sync {
    /// Produce the encoded message.
    fn encode(&self, record: &Record<'_>) -> String;
}

/// Default encoder for RFC 3164 / RFC 5424 messages.
#[derive(Debug, Clone)]
pub struct Producer {
    /// Output wire format.
    pub format: SyslogFormat,
    /// Facility stamped into the PRI field.
    pub facility: Facility,
    /// Origin hostname reported in each record.
    pub hostname: String,
    /// Application name (TAG field / APP-NAME).
    pub app_name: String,
    /// Process id.
    pub pid: u32,
}

impl Producer {
    fn nilable(value: &str) -> &str {
        if value.is_empty() { "-" } else { value }
    }
}

impl EncodeRecord for Producer {
    fn encode(&self, record: &Record<'_>) -> String {
        let pri = record.severity.priority(self.facility);
        let mut out = String::with_capacity(64 + record.message.len());
        match self.format {
            SyslogFormat::Bsd => {
                // <PRI>Mmm dd hh:mm:ss HOST TAG[PID]: MSG
                let stamp = record.timestamp.format("%b %e %H:%M:%S");
                let _ = write!(
                    out,
                    "<{pri}>{stamp} {} {}[{}]: {}",
                    self.hostname, self.app_name, self.pid, record.message
                );
            }
            SyslogFormat::Rfc5424 => {
                // <PRI>1 TIMESTAMP HOST APP-NAME PROCID MSGID SD MSG
                let stamp = record.timestamp.format("%Y-%m-%dT%H:%M:%S%.3f%:z");
                let _ = write!(
                    out,
                    "<{pri}>1 {stamp} {} {} {} - - {}",
                    Self::nilable(&self.hostname),
                    Self::nilable(&self.app_name),
                    self.pid,
                    record.message
                );
            }
        }
        out
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn producer(format: SyslogFormat) -> Producer {
        Producer {
            format,
            facility: Facility::Local0,
            hostname: "testhost".to_string(),
            app_name: "courier".to_string(),
            pid: 4242,
        }
    }

    fn stamp() -> DateTime<Local> {
        Local.with_ymd_and_hms(2003, 10, 11, 22, 14, 15).unwrap()
    }

    #[test]
    fn test_severity_parses_all_eight_levels() {
        for level in ["debug", "info", "notice", "warning", "error", "crit", "alert", "emerg"] {
            assert!(level.parse::<Severity>().is_ok(), "level {level} rejected");
        }
    }

    #[test]
    fn test_severity_err_alias() {
        assert_eq!("err".parse::<Severity>().unwrap(), Severity::Error);
    }

    #[test]
    fn test_severity_rejects_unknown_level() {
        let err = "verbose".parse::<Severity>().unwrap_err();
        assert_eq!(err, UnknownLevel("verbose".to_string()));
    }

    #[test]
    fn test_priority_math() {
        // local0 = 16, debug = 7 -> 16 * 8 + 7 = 135
        assert_eq!(Severity::Debug.priority(Facility::Local0), 135);
        // user = 1, crit = 2 -> 10
        assert_eq!(Severity::Critical.priority(Facility::User), 10);
        assert_eq!(Severity::Emergency.priority(Facility::Kern), 0);
    }

    #[test]
    fn test_bsd_format_shape() {
        let rec = Record {
            severity: Severity::Info,
            timestamp: stamp(),
            message: "hello world",
        };
        let msg = producer(SyslogFormat::Bsd).encode(&rec);
        assert!(msg.starts_with("<134>Oct 11 22:14:15 testhost courier[4242]: "), "{msg}");
        assert!(msg.ends_with("hello world"));
    }

    #[test]
    fn test_rfc5424_format_shape() {
        let rec = Record {
            severity: Severity::Warning,
            timestamp: stamp(),
            message: "disk nearly full",
        };
        let msg = producer(SyslogFormat::Rfc5424).encode(&rec);
        assert!(msg.starts_with("<132>1 2003-10-11T22:14:15.000"), "{msg}");
        assert!(msg.contains(" testhost courier 4242 - - disk nearly full"), "{msg}");
    }

    #[test]
    fn test_rfc5424_nil_fields() {
        let mut p = producer(SyslogFormat::Rfc5424);
        p.hostname = String::new();
        p.app_name = String::new();
        let rec = Record {
            severity: Severity::Debug,
            timestamp: stamp(),
            message: "m",
        };
        let msg = p.encode(&rec);
        assert!(msg.contains(" - - 4242 - - m"), "{msg}");
    }

    #[test]
    fn test_facility_parse() {
        assert_eq!("local7".parse::<Facility>().unwrap(), Facility::Local7);
        assert_eq!("daemon".parse::<Facility>().unwrap(), Facility::Daemon);
        assert!("nope".parse::<Facility>().is_err());
    }
}
