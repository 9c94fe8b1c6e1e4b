use chrono::NaiveDate;
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PatientRecord {
    pub id: String,
    pub birth_date: Option<NaiveDate>,
}

impl PatientRecord {
    /// Age in whole years on `on`, or None without a birth date.
    pub fn age_on(&self, on: NaiveDate) -> Option<u32> {
        let birth = self.birth_date?;
        on.years_since(birth)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn age_before_and_after_birthday() {
        let patient = PatientRecord {
            id: "p1".into(),
            birth_date: NaiveDate::from_ymd_opt(1956, 6, 15),
        };
        let before = NaiveDate::from_ymd_opt(2026, 6, 14).unwrap();
        let after = NaiveDate::from_ymd_opt(2026, 6, 15).unwrap();
        assert_eq!(patient.age_on(before), Some(69));
        assert_eq!(patient.age_on(after), Some(70));
    }

    #[test]
    fn age_unknown_without_birth_date() {
        let patient = PatientRecord { id: "p1".into(), birth_date: None };
        assert_eq!(patient.age_on(NaiveDate::from_ymd_opt(2026, 1, 1).unwrap()), None);
    }
}
