//! ECU identification and comparison against the configured values

use std::fmt;

use serde::{Deserialize, Serialize};
use tracing::warn;

use crate::error::ConfigError;
use crate::kwp::ResponseRecord;

/// Identification strings read from the ECU (service 0x1A)
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct EcuIdentity {
    /// Option 0x92
    pub hardware_number: Option<String>,
    /// Option 0x94
    pub software_number: Option<String>,
    pub part_number: Option<String>,
    pub software_version: Option<String>,
    pub engine_id: Option<String>,
    pub model_id: Option<String>,
}

impl EcuIdentity {
    /// Fill the fields carried by the composite identification (option 0x9B)
    ///
    /// The composite string is fixed-width: part number `[0..12]`, software
    /// version `[12..16]`, engine id `[26..42]`, model id `[42..]`.
    pub fn apply_composite(&mut self, raw: &[u8]) {
        self.part_number = field(raw, 0, Some(12));
        self.software_version = field(raw, 12, Some(16));
        self.engine_id = field(raw, 26, Some(42));
        self.model_id = field(raw, 42, None);
    }
}

/// Raw identification bytes: everything after the response id and option
pub fn identification_bytes(record: &ResponseRecord) -> &[u8] {
    record.data().get(2..).unwrap_or_default()
}

/// Identification payload as trimmed text
pub fn identification_text(record: &ResponseRecord) -> String {
    clean(identification_bytes(record))
}

fn clean(raw: &[u8]) -> String {
    String::from_utf8_lossy(raw)
        .trim_matches(|c: char| c == '\0' || c.is_whitespace())
        .to_string()
}

fn field(raw: &[u8], start: usize, end: Option<usize>) -> Option<String> {
    if start >= raw.len() {
        return None;
    }
    let end = end.unwrap_or(raw.len()).min(raw.len());
    let text = clean(&raw[start..end]);
    (!text.is_empty()).then_some(text)
}

/// Identity the configuration was written for
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ExpectedIdentity {
    pub hw_number: Option<String>,
    pub sw_number: Option<String>,
    pub part_number: Option<String>,
    pub sw_version: Option<String>,
    pub engine_id: Option<String>,
}

/// What to do when the ECU does not match the configuration
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum IdentityPolicy {
    /// Report mismatches and keep going
    #[default]
    Warn,
    /// Refuse to log on any mismatch
    Abort,
}

/// One compared field
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct IdentityRow {
    pub field: &'static str,
    pub expected: String,
    pub actual: String,
    /// Column width used when printing
    pub width: usize,
    pub passed: bool,
}

/// Result of comparing the ECU identity with the configuration
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct IdentityCheck {
    pub rows: Vec<IdentityRow>,
    pub model_id: Option<String>,
}

impl IdentityCheck {
    /// Compare every configured field; unconfigured fields are skipped
    pub fn compare(expected: &ExpectedIdentity, actual: &EcuIdentity) -> Self {
        let fields = [
            ("HWNumber", &expected.hw_number, &actual.hardware_number, 10),
            ("SWNumber", &expected.sw_number, &actual.software_number, 10),
            ("PartNumber", &expected.part_number, &actual.part_number, 12),
            ("SWVersion", &expected.sw_version, &actual.software_version, 4),
            ("EngineId", &expected.engine_id, &actual.engine_id, 16),
        ];

        let rows = fields
            .into_iter()
            .filter_map(|(field, expected, actual, width)| {
                let expected = expected.as_deref()?.trim().to_string();
                let actual = actual.clone().unwrap_or_default();
                Some(IdentityRow {
                    field,
                    passed: expected == actual,
                    expected,
                    actual,
                    width,
                })
            })
            .collect();

        Self {
            rows,
            model_id: actual.model_id.clone(),
        }
    }

    pub fn passed(&self) -> bool {
        self.rows.iter().all(|row| row.passed)
    }

    /// Names of the fields that did not match
    pub fn failures(&self) -> Vec<String> {
        self.rows
            .iter()
            .filter(|row| !row.passed)
            .map(|row| row.field.to_string())
            .collect()
    }

    /// Apply the policy: warn and continue, or fail on any mismatch
    pub fn enforce(&self, policy: IdentityPolicy) -> Result<(), ConfigError> {
        if self.passed() {
            return Ok(());
        }
        for row in self.rows.iter().filter(|row| !row.passed) {
            warn!(
                field = row.field,
                expected = %row.expected,
                actual = %row.actual,
                "ECU identity does not match configuration"
            );
        }
        match policy {
            IdentityPolicy::Warn => Ok(()),
            IdentityPolicy::Abort => Err(ConfigError::IdentityMismatch(self.failures())),
        }
    }
}

impl fmt::Display for IdentityCheck {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for row in &self.rows {
            writeln!(
                f,
                "Checking {:<11} - config:[{:<w$}] ecu:[{:<w$}] : {}",
                row.field,
                row.expected,
                row.actual,
                if row.passed { "pass" } else { "FAIL" },
                w = row.width
            )?;
        }
        write!(
            f,
            "Displaying ModelId  - ecu:[{}]",
            self.model_id.as_deref().unwrap_or_default()
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    const COMPOSITE: &[u8] = b"06A906032HS 0002          1.8L R4/5VT     Passat";

    fn expected() -> ExpectedIdentity {
        ExpectedIdentity {
            hw_number: Some("0261206518".into()),
            sw_number: Some("1037359510".into()),
            part_number: Some("06A906032HS".into()),
            sw_version: Some("0002".into()),
            engine_id: Some("1.8L R4/5VT".into()),
        }
    }

    fn identity() -> EcuIdentity {
        let mut identity = EcuIdentity {
            hardware_number: Some("0261206518".into()),
            software_number: Some("1037359510".into()),
            ..Default::default()
        };
        identity.apply_composite(COMPOSITE);
        identity
    }

    #[test]
    fn test_composite_fields() {
        let identity = identity();
        assert_eq!(identity.part_number.as_deref(), Some("06A906032HS"));
        assert_eq!(identity.software_version.as_deref(), Some("0002"));
        assert_eq!(identity.engine_id.as_deref(), Some("1.8L R4/5VT"));
        assert_eq!(identity.model_id.as_deref(), Some("Passat"));
    }

    #[test]
    fn test_short_composite_leaves_fields_empty() {
        let mut identity = EcuIdentity::default();
        identity.apply_composite(b"06A906032HS 0002");
        assert_eq!(identity.part_number.as_deref(), Some("06A906032HS"));
        assert_eq!(identity.engine_id, None);
        assert_eq!(identity.model_id, None);
    }

    #[test]
    fn test_identification_text_is_trimmed() {
        let record = ResponseRecord::new(&[0x5A, 0x92, b' ', b'0', b'2', 0x00]);
        assert_eq!(identification_text(&record), "02");
    }

    #[test]
    fn test_matching_identity_passes() {
        let check = IdentityCheck::compare(&expected(), &identity());
        assert!(check.passed());
        assert_eq!(check.rows.len(), 5);
        assert!(check.enforce(IdentityPolicy::Abort).is_ok());
    }

    #[test]
    fn test_mismatch_policies() {
        let mut actual = identity();
        actual.software_version = Some("0001".into());
        let check = IdentityCheck::compare(&expected(), &actual);

        assert_eq!(check.failures(), vec!["SWVersion".to_string()]);
        assert!(check.enforce(IdentityPolicy::Warn).is_ok());
        assert_eq!(
            check.enforce(IdentityPolicy::Abort),
            Err(ConfigError::IdentityMismatch(vec!["SWVersion".into()]))
        );
    }

    #[test]
    fn test_unconfigured_fields_are_skipped() {
        let check = IdentityCheck::compare(&ExpectedIdentity::default(), &EcuIdentity::default());
        assert!(check.rows.is_empty());
        assert!(check.passed());
    }

    #[test]
    fn test_check_table_rendering() {
        let mut actual = identity();
        actual.hardware_number = None;
        let check = IdentityCheck::compare(&expected(), &actual);
        let table = check.to_string();
        let lines: Vec<&str> = table.lines().collect();

        assert_eq!(
            lines[0],
            "Checking HWNumber    - config:[0261206518] ecu:[          ] : FAIL"
        );
        assert_eq!(
            lines[3],
            "Checking SWVersion   - config:[0002] ecu:[0002] : pass"
        );
        assert_eq!(lines[5], "Displaying ModelId  - ecu:[Passat]");
    }
}
