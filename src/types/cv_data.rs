// src/types/cv_data.rs
//! CV data structures shared by the store, the HTTP layer and the export pipeline

use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

// ===== Users & Profiles =====

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, sqlx::FromRow)]
pub struct User {
    pub id: i64,
    pub username: String,
    pub first_name: String,
    pub last_name: String,
    pub email: Option<String>,
    pub is_active: bool,
    pub created_at: DateTime<Utc>,
}

impl User {
    pub fn full_name(&self) -> String {
        let full = format!("{} {}", self.first_name.trim(), self.last_name.trim());
        let full = full.trim();
        if full.is_empty() {
            self.username.clone()
        } else {
            full.to_string()
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Sex {
    #[serde(rename = "H")]
    Male,
    #[serde(rename = "M")]
    Female,
}

impl Sex {
    pub fn code(&self) -> &'static str {
        match self {
            Sex::Male => "H",
            Sex::Female => "M",
        }
    }

    pub fn from_code(code: &str) -> Option<Self> {
        match code {
            "H" => Some(Sex::Male),
            "M" => Some(Sex::Female),
            _ => None,
        }
    }
}

/// Personal data block; one per user, created on first access.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct Profile {
    pub description: String,
    pub active: bool,
    pub birthplace: String,
    pub national_id: Option<String>,
    pub profession: String,
    pub mobile_phone: String,
    pub landline_phone: String,
    pub home_address: String,
    pub work_address: String,
    pub nationality: String,
    pub birth_date: Option<NaiveDate>,
    pub sex: Option<Sex>,
    pub marital_status: String,
    pub driving_license: String,
    pub website: String,
    /// Resource reference of the profile photo.
    pub photo: Option<String>,
}

impl Default for Profile {
    fn default() -> Self {
        Self {
            description: String::new(),
            active: true,
            birthplace: String::new(),
            national_id: None,
            profession: String::new(),
            mobile_phone: String::new(),
            landline_phone: String::new(),
            home_address: String::new(),
            work_address: String::new(),
            nationality: String::new(),
            birth_date: None,
            sex: None,
            marital_status: String::new(),
            driving_license: String::new(),
            website: String::new(),
            photo: None,
        }
    }
}

impl Profile {
    pub fn validate(&self) -> Result<(), String> {
        if let Some(id) = &self.national_id {
            if id.chars().count() > 10 {
                return Err("national_id must be at most 10 characters".to_string());
            }
        }
        if self.mobile_phone.chars().count() > 15 {
            return Err("mobile_phone must be at most 15 characters".to_string());
        }
        Ok(())
    }
}

// ===== Sections =====

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum SectionKind {
    Experience,
    Education,
    Course,
    Skill,
    Product,
    Recommendation,
    GarageSale,
}

impl SectionKind {
    pub const ALL: [SectionKind; 7] = [
        SectionKind::Experience,
        SectionKind::Education,
        SectionKind::Course,
        SectionKind::Skill,
        SectionKind::Product,
        SectionKind::Recommendation,
        SectionKind::GarageSale,
    ];

    /// Kinds whose certificates are appended to the export, in append order.
    pub const CERTIFIED: [SectionKind; 3] = [
        SectionKind::Experience,
        SectionKind::Course,
        SectionKind::Recommendation,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            SectionKind::Experience => "experience",
            SectionKind::Education => "education",
            SectionKind::Course => "course",
            SectionKind::Skill => "skill",
            SectionKind::Product => "product",
            SectionKind::Recommendation => "recommendation",
            SectionKind::GarageSale => "garage-sale",
        }
    }

    pub fn accepts_certificate(&self) -> bool {
        Self::CERTIFIED.contains(self)
    }

    /// Key prefix for newly uploaded certificates of this kind.
    pub fn certificate_prefix(&self) -> String {
        format!("certificates/{}", self.as_str())
    }

    /// Older store layouts kept certificates under per-kind folders.
    pub fn legacy_certificate_keys(&self, basename: &str) -> Vec<String> {
        match self {
            SectionKind::Experience | SectionKind::Course => vec![
                format!("{}/certificates/{}", self.as_str(), basename),
                format!("{}/{}", self.as_str(), basename),
            ],
            _ => Vec::new(),
        }
    }
}

impl fmt::Display for SectionKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for SectionKind {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let normalized = s.trim().to_lowercase().replace('_', "-");
        let singular = match normalized.as_str() {
            "experiences" => "experience",
            "courses" => "course",
            "skills" => "skill",
            "products" => "product",
            "recommendations" => "recommendation",
            "garage-sales" => "garage-sale",
            other => other,
        };
        SectionKind::ALL
            .iter()
            .find(|kind| kind.as_str() == singular)
            .copied()
            .ok_or_else(|| format!("Unknown section kind: {}", s))
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct Experience {
    pub company: String,
    pub role: String,
    pub position: String,
    pub location: String,
    pub company_email: String,
    pub company_website: String,
    pub contact_name: String,
    pub contact_phone: String,
    pub start_date: Option<NaiveDate>,
    pub end_date: Option<NaiveDate>,
    pub description: String,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub enum EducationStatus {
    #[default]
    Completed,
    InProgress,
    NotCompleted,
}

impl EducationStatus {
    pub fn label(&self) -> &'static str {
        match self {
            EducationStatus::Completed => "Completed",
            EducationStatus::InProgress => "In progress",
            EducationStatus::NotCompleted => "Not completed",
        }
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct Education {
    pub title: String,
    pub institution: String,
    pub status: EducationStatus,
    pub graduated: bool,
    pub start_date: Option<NaiveDate>,
    pub end_date: Option<NaiveDate>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct Course {
    pub name: String,
    pub institution: String,
    pub sponsor: String,
    pub contact_name: String,
    pub contact_phone: String,
    pub sponsor_email: String,
    pub total_hours: Option<u32>,
    pub start_date: Option<NaiveDate>,
    pub end_date: Option<NaiveDate>,
    pub description: String,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct Skill {
    pub name: String,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct Product {
    pub title: String,
    pub name: String,
    /// Academic or work output.
    #[serde(rename = "type")]
    pub product_type: String,
    pub classifier: String,
    pub description: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum RecognitionType {
    Academic,
    Public,
    Private,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct Recommendation {
    pub contact_name: String,
    pub contact_phone: String,
    pub relation: String,
    pub recognition_type: Option<RecognitionType>,
    pub recognition_date: Option<NaiveDate>,
    pub description: String,
    pub sponsor: String,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub enum ItemCondition {
    #[default]
    Good,
    Fair,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct GarageSale {
    pub product_name: String,
    pub condition: ItemCondition,
    pub description: String,
    pub price_cents: i64,
}

/// Typed section body, tagged by `kind` on the wire and in the store.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(tag = "kind", rename_all = "kebab-case")]
pub enum SectionPayload {
    Experience(Experience),
    Education(Education),
    Course(Course),
    Skill(Skill),
    Product(Product),
    Recommendation(Recommendation),
    GarageSale(GarageSale),
}

fn check_dates(start: Option<NaiveDate>, end: Option<NaiveDate>) -> Result<(), String> {
    match (start, end) {
        (Some(start), Some(end)) if end < start => {
            Err(format!("end_date {} is before start_date {}", end, start))
        }
        _ => Ok(()),
    }
}

fn require(field: &str, value: &str) -> Result<(), String> {
    if value.trim().is_empty() {
        Err(format!("{} is required", field))
    } else {
        Ok(())
    }
}

impl SectionPayload {
    pub fn kind(&self) -> SectionKind {
        match self {
            SectionPayload::Experience(_) => SectionKind::Experience,
            SectionPayload::Education(_) => SectionKind::Education,
            SectionPayload::Course(_) => SectionKind::Course,
            SectionPayload::Skill(_) => SectionKind::Skill,
            SectionPayload::Product(_) => SectionKind::Product,
            SectionPayload::Recommendation(_) => SectionKind::Recommendation,
            SectionPayload::GarageSale(_) => SectionKind::GarageSale,
        }
    }

    /// Short human label used in logs and listings.
    pub fn title(&self) -> String {
        match self {
            SectionPayload::Experience(e) => format!("{} - {}", e.role, e.company),
            SectionPayload::Education(e) => format!("{} - {}", e.title, e.institution),
            SectionPayload::Course(c) => c.name.clone(),
            SectionPayload::Skill(s) => s.name.clone(),
            SectionPayload::Product(p) => {
                if p.title.is_empty() {
                    p.name.clone()
                } else {
                    p.title.clone()
                }
            }
            SectionPayload::Recommendation(r) => r.contact_name.clone(),
            SectionPayload::GarageSale(g) => g.product_name.clone(),
        }
    }

    pub fn validate(&self) -> Result<(), String> {
        match self {
            SectionPayload::Experience(e) => {
                require("company", &e.company)?;
                require("role", &e.role)?;
                if e.start_date.is_none() {
                    return Err("start_date is required".to_string());
                }
                check_dates(e.start_date, e.end_date)
            }
            SectionPayload::Education(e) => {
                require("title", &e.title)?;
                require("institution", &e.institution)?;
                check_dates(e.start_date, e.end_date)
            }
            SectionPayload::Course(c) => {
                require("name", &c.name)?;
                require("institution", &c.institution)?;
                check_dates(c.start_date, c.end_date)
            }
            SectionPayload::Skill(s) => require("name", &s.name),
            SectionPayload::Product(p) => {
                require("title", &p.title)?;
                require("type", &p.product_type)
            }
            SectionPayload::Recommendation(r) => {
                require("contact_name", &r.contact_name)?;
                require("contact_phone", &r.contact_phone)
            }
            SectionPayload::GarageSale(g) => {
                require("product_name", &g.product_name)?;
                if g.price_cents < 0 {
                    return Err("price_cents must not be negative".to_string());
                }
                Ok(())
            }
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Section {
    pub id: i64,
    pub owner_id: i64,
    pub sort_order: i64,
    pub active: bool,
    /// Resource reference of the attached certificate, if any.
    pub certificate: Option<String>,
    #[serde(flatten)]
    pub payload: SectionPayload,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Section {
    pub fn kind(&self) -> SectionKind {
        self.payload.kind()
    }
}

/// Everything needed to render one user's CV.
#[derive(Debug, Clone, Serialize)]
pub struct CvDocument {
    pub user: User,
    pub profile: Profile,
    pub sections: Vec<Section>,
}

impl CvDocument {
    /// Sections of one kind, in stored order.
    pub fn sections_of(&self, kind: SectionKind) -> impl Iterator<Item = &Section> + '_ {
        self.sections.iter().filter(move |s| s.kind() == kind)
    }

    pub fn full_name(&self) -> String {
        self.user.full_name()
    }
}
