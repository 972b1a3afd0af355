//! Profile fields

use chrono::{Datelike, NaiveDate};
use once_cell::sync::Lazy;
use regex::Regex;

use super::ValidationError;

const MAX_DISPLAY_NAME_LEN: usize = 64;
const MAX_BIO_LEN: usize = 1000;
const MAX_GENDER_LEN: usize = 32;
const MAX_INTERESTS: usize = 20;
const MAX_INTEREST_LEN: usize = 32;

/// Minimum age to hold an account
pub const MIN_AGE: u32 = 18;
const MAX_AGE: u32 = 120;

/// US ZIP or ZIP+4, ASCII digits only
static ZIP_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^[0-9]{5}(-[0-9]{4})?$").expect("invalid zip regex"));

/// Name shown to other users
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DisplayName(String);

impl DisplayName {
    pub fn new(s: &str) -> Result<Self, ValidationError> {
        let name = s.trim();
        if name.is_empty() {
            return Err(ValidationError::Empty { field: "display name" });
        }
        if name.chars().count() > MAX_DISPLAY_NAME_LEN {
            return Err(ValidationError::TooLong {
                field: "display name",
                max: MAX_DISPLAY_NAME_LEN,
            });
        }
        Ok(Self(name.to_owned()))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

/// Free-text profile bio. Empty is allowed and clears the bio.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Bio(String);

impl Bio {
    pub fn new(s: &str) -> Result<Self, ValidationError> {
        let bio = s.trim();
        if bio.chars().count() > MAX_BIO_LEN {
            return Err(ValidationError::TooLong {
                field: "bio",
                max: MAX_BIO_LEN,
            });
        }
        Ok(Self(bio.to_owned()))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

/// Self-described gender, free text
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Gender(String);

impl Gender {
    pub fn new(s: &str) -> Result<Self, ValidationError> {
        let gender = s.trim();
        if gender.chars().count() > MAX_GENDER_LEN {
            return Err(ValidationError::TooLong {
                field: "gender",
                max: MAX_GENDER_LEN,
            });
        }
        Ok(Self(gender.to_owned()))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

/// US ZIP code, stored as the 5-digit prefix
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ZipCode(String);

impl ZipCode {
    /// # Example
    /// ```
    /// use amity_server::models::ZipCode;
    ///
    /// assert_eq!(ZipCode::new("90210-1234").unwrap().as_str(), "90210");
    /// assert!(ZipCode::new("9021").is_err());
    /// ```
    pub fn new(s: &str) -> Result<Self, ValidationError> {
        let zip = s.trim();
        if zip.is_empty() {
            return Err(ValidationError::Empty { field: "zip code" });
        }
        if !ZIP_RE.is_match(zip) {
            return Err(ValidationError::InvalidFormat {
                field: "zip code",
                reason: "must be 5 digits or ZIP+4",
            });
        }
        Ok(Self(zip[..5].to_owned()))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

/// Date of birth of an adult user
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BirthDate(NaiveDate);

impl BirthDate {
    /// Validate against `today`. Users must be at least 18.
    pub fn new(date: NaiveDate, today: NaiveDate) -> Result<Self, ValidationError> {
        match age_on(date, today) {
            None => Err(ValidationError::InvalidFormat {
                field: "birth date",
                reason: "cannot be in the future",
            }),
            Some(age) if age < MIN_AGE => Err(ValidationError::InvalidFormat {
                field: "birth date",
                reason: "you must be at least 18 years old",
            }),
            Some(age) if age > MAX_AGE => Err(ValidationError::InvalidFormat {
                field: "birth date",
                reason: "is not plausible",
            }),
            Some(_) => Ok(Self(date)),
        }
    }

    pub fn date(&self) -> NaiveDate {
        self.0
    }
}

/// Age in whole years on `today`, or None if `birth` is after `today`
pub fn age_on(birth: NaiveDate, today: NaiveDate) -> Option<u32> {
    if birth > today {
        return None;
    }
    let mut age = today.year() - birth.year();
    if (today.month(), today.day()) < (birth.month(), birth.day()) {
        age -= 1;
    }
    u32::try_from(age).ok()
}

/// Interest tags, trimmed, lowercased, de-duplicated in order
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct Interests(Vec<String>);

impl Interests {
    pub fn new(tags: &[String]) -> Result<Self, ValidationError> {
        let mut out: Vec<String> = Vec::with_capacity(tags.len());

        for tag in tags {
            let tag = tag.trim().to_lowercase();
            if tag.is_empty() {
                continue;
            }
            if tag.chars().count() > MAX_INTEREST_LEN {
                return Err(ValidationError::TooLong {
                    field: "interest",
                    max: MAX_INTEREST_LEN,
                });
            }
            if !out.contains(&tag) {
                out.push(tag);
            }
        }

        if out.len() > MAX_INTERESTS {
            return Err(ValidationError::InvalidFormat {
                field: "interests",
                reason: "at most 20 interests are allowed",
            });
        }

        Ok(Self(out))
    }

    pub fn as_slice(&self) -> &[String] {
        &self.0
    }

    pub fn into_vec(self) -> Vec<String> {
        self.0
    }
}
