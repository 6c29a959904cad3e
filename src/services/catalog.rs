use std::collections::BTreeMap;

use rust_decimal::Decimal;
use rust_decimal_macros::dec;
use serde::{Deserialize, Serialize};

pub(crate) const ONLINE_COURSE_ID: &str = "online-course";
pub(crate) const BEHIND_THE_WHEEL_COURSE_ID: &str = "behind-the-wheel";
pub(crate) const COMPLETE_PACKAGE_COURSE_ID: &str = "complete-package";

/// When a bundle component becomes accessible in split-payment mode.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub(crate) enum UnlockStage {
    Upfront,
    FullPayment,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub(crate) struct BundleComponent {
    pub(crate) course_id: String,
    pub(crate) unlocks_at: UnlockStage,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub(crate) struct CoursePricing {
    pub(crate) course_id: String,
    pub(crate) title: String,
    pub(crate) total: Decimal,
    pub(crate) upfront: Decimal,
    pub(crate) remaining: Decimal,
    #[serde(default)]
    pub(crate) components: Vec<BundleComponent>,
    /// Access additionally waits for a prerequisite certificate.
    #[serde(default)]
    pub(crate) certificate_gated: bool,
}

impl CoursePricing {
    pub(crate) fn is_bundle(&self) -> bool {
        !self.components.is_empty()
    }

    /// The first installment owed at purchase; a zero upfront means the whole price.
    pub(crate) fn upfront_or_total(&self) -> Decimal {
        if self.upfront.is_zero() {
            self.total
        } else {
            self.upfront
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) struct PricingCatalog {
    courses: BTreeMap<String, CoursePricing>,
}

impl PricingCatalog {
    pub(crate) fn builtin() -> Self {
        let courses = vec![
            CoursePricing {
                course_id: ONLINE_COURSE_ID.to_string(),
                title: "24-hour online driver education".to_string(),
                total: dec!(99.99),
                upfront: dec!(99.99),
                remaining: Decimal::ZERO,
                components: Vec::new(),
                certificate_gated: false,
            },
            CoursePricing {
                course_id: BEHIND_THE_WHEEL_COURSE_ID.to_string(),
                title: "8-hour behind-the-wheel instruction".to_string(),
                total: dec!(499.99),
                upfront: dec!(499.99),
                remaining: Decimal::ZERO,
                components: Vec::new(),
                certificate_gated: true,
            },
            CoursePricing {
                course_id: COMPLETE_PACKAGE_COURSE_ID.to_string(),
                title: "Complete package (online + behind-the-wheel)".to_string(),
                total: dec!(549.99),
                upfront: dec!(99.99),
                remaining: dec!(450.00),
                components: vec![
                    BundleComponent {
                        course_id: ONLINE_COURSE_ID.to_string(),
                        unlocks_at: UnlockStage::Upfront,
                    },
                    BundleComponent {
                        course_id: BEHIND_THE_WHEEL_COURSE_ID.to_string(),
                        unlocks_at: UnlockStage::FullPayment,
                    },
                ],
                certificate_gated: false,
            },
        ];

        Self::from_courses(courses).unwrap_or_else(|_| Self { courses: BTreeMap::new() })
    }

    pub(crate) fn from_json(raw: &str) -> Result<Self, String> {
        let courses: Vec<CoursePricing> =
            serde_json::from_str(raw).map_err(|err| format!("malformed catalog JSON: {err}"))?;
        Self::from_courses(courses)
    }

    pub(crate) fn from_courses(courses: Vec<CoursePricing>) -> Result<Self, String> {
        let mut map = BTreeMap::new();
        for course in courses {
            validate_pricing(&course)?;
            let course_id = course.course_id.clone();
            if map.insert(course_id.clone(), course).is_some() {
                return Err(format!("duplicate course id '{course_id}'"));
            }
        }

        for course in map.values().filter(|course| course.is_bundle()) {
            for component in &course.components {
                match map.get(&component.course_id) {
                    None => {
                        return Err(format!(
                            "bundle '{}' references unknown component '{}'",
                            course.course_id, component.course_id
                        ))
                    }
                    Some(target) if target.is_bundle() => {
                        return Err(format!(
                            "bundle '{}' cannot contain bundle '{}'",
                            course.course_id, component.course_id
                        ))
                    }
                    Some(_) => {}
                }
            }
        }

        Ok(Self { courses: map })
    }

    pub(crate) fn lookup(&self, course_id: &str) -> Option<&CoursePricing> {
        self.courses.get(course_id)
    }

    pub(crate) fn courses(&self) -> impl Iterator<Item = &CoursePricing> {
        self.courses.values()
    }

    pub(crate) fn len(&self) -> usize {
        self.courses.len()
    }
}

fn validate_pricing(course: &CoursePricing) -> Result<(), String> {
    if course.course_id.trim().is_empty() {
        return Err("course id must not be empty".to_string());
    }
    if course.total.is_sign_negative()
        || course.upfront.is_sign_negative()
        || course.remaining.is_sign_negative()
    {
        return Err(format!("course '{}' has a negative price", course.course_id));
    }
    if course.upfront > course.total {
        return Err(format!("course '{}' upfront exceeds total", course.course_id));
    }
    if !course.remaining.is_zero() && course.upfront + course.remaining != course.total {
        return Err(format!(
            "course '{}' upfront + remaining must equal total",
            course.course_id
        ));
    }
    if course.components.iter().any(|component| component.course_id == course.course_id) {
        return Err(format!("bundle '{}' lists itself as a component", course.course_id));
    }
    Ok(())
}

/// Emails that are enrolled with full access and no balance.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub(crate) struct AutoEnrollAllowlist {
    emails: Vec<String>,
}

impl AutoEnrollAllowlist {
    pub(crate) fn new<I, S>(emails: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        Self {
            emails: emails
                .into_iter()
                .map(|email| email.as_ref().trim().to_lowercase())
                .filter(|email| !email.is_empty())
                .collect(),
        }
    }

    pub(crate) fn contains(&self, email: &str) -> bool {
        let needle = email.trim().to_lowercase();
        !needle.is_empty() && self.emails.iter().any(|entry| *entry == needle)
    }

    pub(crate) fn is_empty(&self) -> bool {
        self.emails.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn builtin_catalog_has_bundle_with_split_pricing() {
        let catalog = PricingCatalog::builtin();
        assert_eq!(catalog.len(), 3);

        let bundle = catalog.lookup(COMPLETE_PACKAGE_COURSE_ID).expect("bundle");
        assert!(bundle.is_bundle());
        assert_eq!(bundle.total, dec!(549.99));
        assert_eq!(bundle.upfront_or_total(), dec!(99.99));
        assert_eq!(bundle.components.len(), 2);
        assert_eq!(bundle.components[0].unlocks_at, UnlockStage::Upfront);
        assert_eq!(bundle.components[1].unlocks_at, UnlockStage::FullPayment);

        assert!(catalog.lookup("unknown").is_none());
    }

    #[test]
    fn catalog_json_accepts_string_amounts() {
        let raw = r#"[
            {"course_id": "theory", "title": "Theory", "total": "120.00", "upfront": "0", "remaining": "0"}
        ]"#;
        let catalog = PricingCatalog::from_json(raw).expect("catalog");
        let theory = catalog.lookup("theory").expect("theory");
        assert_eq!(theory.upfront_or_total(), dec!(120.00));
        assert!(!theory.certificate_gated);
    }

    #[test]
    fn catalog_rejects_unknown_component() {
        let raw = r#"[
            {"course_id": "bundle", "title": "Bundle", "total": "10", "upfront": "5", "remaining": "5",
             "components": [{"course_id": "ghost", "unlocks_at": "upfront"}]}
        ]"#;
        let err = PricingCatalog::from_json(raw).expect_err("unknown component");
        assert!(err.contains("ghost"));
    }

    #[test]
    fn catalog_rejects_inconsistent_installments() {
        let raw = r#"[
            {"course_id": "odd", "title": "Odd", "total": "100", "upfront": "30", "remaining": "50"}
        ]"#;
        assert!(PricingCatalog::from_json(raw).is_err());
    }

    #[test]
    fn allowlist_matches_case_insensitively() {
        let allowlist = AutoEnrollAllowlist::new(["Owner@DrivingSchool.test", " "]);
        assert!(allowlist.contains("owner@drivingschool.test"));
        assert!(allowlist.contains("  OWNER@drivingschool.TEST "));
        assert!(!allowlist.contains("student@drivingschool.test"));
        assert!(!allowlist.contains(""));
        assert!(AutoEnrollAllowlist::default().is_empty());
    }
}
