// Records mirrored from the QuickAssist backend
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

pub use crate::common::job_status::JobStatus;

pub type UserId = i64;
pub type JobId = i64;
pub type ServiceId = i64;

/// The backend serializes `DecimalField`s as strings ("-1.292066"); older
/// endpoints send plain numbers. Both decode to `f64`.
pub(crate) mod decimal {
    use serde::{Deserialize, Deserializer, Serializer};

    #[derive(Deserialize)]
    #[serde(untagged)]
    pub(super) enum Raw {
        Num(f64),
        Text(String),
    }

    impl Raw {
        pub(super) fn into_f64<E: serde::de::Error>(self) -> Result<f64, E> {
            match self {
                Raw::Num(n) => Ok(n),
                Raw::Text(s) => s.trim().parse::<f64>().map_err(|e| E::custom(format!("invalid decimal '{}': {}", s, e))),
            }
        }
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(d: D) -> Result<f64, D::Error> {
        Raw::deserialize(d)?.into_f64()
    }

    pub fn serialize<S: Serializer>(v: &f64, s: S) -> Result<S::Ok, S::Error> {
        s.serialize_f64(*v)
    }
}

pub(crate) mod opt_decimal {
    use super::decimal::Raw;
    use serde::{Deserialize, Deserializer, Serializer};

    pub fn deserialize<'de, D: Deserializer<'de>>(d: D) -> Result<Option<f64>, D::Error> {
        match Option::<Raw>::deserialize(d)? {
            Some(raw) => raw.into_f64().map(Some),
            None => Ok(None),
        }
    }

    pub fn serialize<S: Serializer>(v: &Option<f64>, s: S) -> Result<S::Ok, S::Error> {
        match v {
            Some(n) => s.serialize_some(n),
            None => s.serialize_none(),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Role {
    Customer,
    Provider,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct User {
    pub id: UserId,
    pub email: String,
    #[serde(default)]
    pub first_name: String,
    #[serde(default)]
    pub last_name: String,
    pub role: Role,
    #[serde(default)]
    pub profile: Option<Profile>,
}

#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct Profile {
    #[serde(default)]
    pub phone_number: Option<String>,
    #[serde(default)]
    pub profile_picture_url: Option<String>,
    #[serde(default)]
    pub provider_profile: Option<ProviderProfile>,
}

#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct ProviderProfile {
    #[serde(default)]
    pub bio: Option<String>,
    #[serde(default)]
    pub is_verified: bool,
    #[serde(default)]
    pub is_available: bool,
    #[serde(default, with = "opt_decimal")]
    pub average_rating: Option<f64>,
    #[serde(default, with = "opt_decimal")]
    pub latitude: Option<f64>,
    #[serde(default, with = "opt_decimal")]
    pub longitude: Option<f64>,
    #[serde(default)]
    pub services: Vec<Service>,
}

impl User {
    pub fn display_name(&self) -> String {
        let full = format!("{} {}", self.first_name.trim(), self.last_name.trim());
        let full = full.trim();
        if full.is_empty() { self.email.clone() } else { full.to_string() }
    }

    pub fn is_provider(&self) -> bool {
        self.role == Role::Provider
    }

    pub fn provider_profile(&self) -> Option<&ProviderProfile> {
        self.profile.as_ref().and_then(|p| p.provider_profile.as_ref())
    }

    pub fn is_verified_provider(&self) -> bool {
        self.provider_profile().map(|p| p.is_verified).unwrap_or(false)
    }

    pub fn phone_number(&self) -> Option<&str> {
        self.profile.as_ref().and_then(|p| p.phone_number.as_deref())
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Service {
    pub id: ServiceId,
    pub name: String,
    #[serde(default, with = "opt_decimal")]
    pub base_price: Option<f64>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ServiceCategory {
    pub id: i64,
    pub name: String,
    #[serde(default)]
    pub description: String,
    #[serde(default)]
    pub icon_url: Option<String>,
    #[serde(default)]
    pub services: Vec<Service>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Review {
    #[serde(default)]
    pub id: Option<i64>,
    pub rating: u8,
    #[serde(default)]
    pub comment: Option<String>,
    #[serde(default)]
    pub customer_name: Option<String>,
    #[serde(default)]
    pub created_at: Option<DateTime<Utc>>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProviderReviews {
    #[serde(default, with = "opt_decimal")]
    pub average_rating: Option<f64>,
    #[serde(default)]
    pub reviews: Vec<Review>,
}

/// A job as seen by its customer and (once assigned) its provider.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ServiceRequest {
    pub id: JobId,
    pub status: JobStatus,
    pub service: Service,
    pub customer: User,
    #[serde(default)]
    pub provider: Option<User>,
    #[serde(with = "decimal")]
    pub request_latitude: f64,
    #[serde(with = "decimal")]
    pub request_longitude: f64,
    pub created_at: DateTime<Utc>,
    #[serde(default)]
    pub updated_at: Option<DateTime<Utc>>,
    #[serde(default)]
    pub review: Option<Review>,
    #[serde(default, with = "opt_decimal")]
    pub final_price: Option<f64>,
}

impl ServiceRequest {
    /// What the customer is asked to pay: the agreed price, else the list price.
    pub fn amount_due(&self) -> Option<f64> {
        self.final_price.or(self.service.base_price)
    }

    pub fn is_customer(&self, user: &User) -> bool {
        self.customer.id == user.id
    }

    pub fn is_assigned_to(&self, user: &User) -> bool {
        self.provider.as_ref().map(|p| p.id == user.id).unwrap_or(false)
    }
}

/// The reduced record the provider feed returns for unassigned jobs.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AvailableRequest {
    pub id: JobId,
    pub service: Service,
    #[serde(default)]
    pub customer_name: String,
    #[serde(with = "decimal")]
    pub request_latitude: f64,
    #[serde(with = "decimal")]
    pub request_longitude: f64,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChatMessage {
    pub id: i64,
    pub sender: User,
    pub text: String,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Coordinates {
    #[serde(with = "decimal")]
    pub latitude: f64,
    #[serde(with = "decimal")]
    pub longitude: f64,
}

impl Coordinates {
    pub fn validate(latitude: f64, longitude: f64) -> Result<Self, String> {
        if !latitude.is_finite() || !(-90.0..=90.0).contains(&latitude) {
            return Err(format!("Latitude {} is out of range (-90..90).", latitude));
        }
        if !longitude.is_finite() || !(-180.0..=180.0).contains(&longitude) {
            return Err(format!("Longitude {} is out of range (-180..180).", longitude));
        }
        Ok(Self { latitude: round6(latitude), longitude: round6(longitude) })
    }
}

fn round6(v: f64) -> f64 {
    (v * 1_000_000.0).round() / 1_000_000.0
}

/// Last known provider position on a job's map. Only the newest is kept.
#[derive(Debug, Clone, PartialEq)]
pub struct LocationSample {
    pub provider_id: Option<UserId>,
    pub latitude: f64,
    pub longitude: f64,
    pub received_at: DateTime<Utc>,
}

impl LocationSample {
    pub fn new(provider_id: Option<UserId>, at: Coordinates) -> Self {
        Self { provider_id, latitude: at.latitude, longitude: at.longitude, received_at: Utc::now() }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TokenPair {
    pub access: String,
    pub refresh: String,
}

/// Login and registration both answer with a token pair; registration also
/// echoes the new user.
#[derive(Debug, Clone, Deserialize)]
pub struct AuthResponse {
    pub access: String,
    pub refresh: String,
    #[serde(default)]
    pub user: Option<User>,
}

impl AuthResponse {
    pub fn tokens(&self) -> TokenPair {
        TokenPair { access: self.access.clone(), refresh: self.refresh.clone() }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RegisterForm {
    pub email: String,
    pub password: String,
    pub first_name: String,
    pub last_name: String,
    pub role: Role,
    pub phone_number: String,
}

impl RegisterForm {
    pub fn validate(&self) -> Result<(), String> {
        let mut problems = Vec::new();
        if !self.email.contains('@') {
            problems.push("Enter a valid email address.");
        }
        if self.password.chars().count() < 8 {
            problems.push("Password must be at least 8 characters.");
        }
        if self.phone_number.trim().is_empty() {
            problems.push("Phone number cannot be blank.");
        }
        if problems.is_empty() { Ok(()) } else { Err(problems.join(" ")) }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct NewServiceRequest {
    pub service: ServiceId,
    pub request_latitude: f64,
    pub request_longitude: f64,
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct ActionReceipt {
    #[serde(default)]
    pub message: Option<String>,
}
