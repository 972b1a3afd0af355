//! User profile endpoints

use std::sync::Arc;

use amity_core::Relationship;
use axum::{
    extract::{DefaultBodyLimit, Multipart, Query, State},
    http::StatusCode,
    routing::{get, post},
    Json, Router,
};
use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::db::repos::{ConnectionRepo, ProfileUpdate, User, UserRepo};
use crate::geo::GeoError;
use crate::http::error::ApiError;
use crate::http::extractors::{AuthUser, ValidUuid};
use crate::http::server::AppState;
use crate::models::{
    age_on, Bio, BirthDate, DisplayName, Gender, Interests, Paginated, Pagination, PaginationParams,
    ValidationError,
    ZipCode,
};
use crate::uploads::public_url;

/// Multipart overhead allowed on top of the photo itself
const MULTIPART_SLACK: usize = 64 * 1024;

/// Profile as other users see it
#[derive(Debug, Serialize)]
pub struct UserResponse {
    pub id: Uuid,
    pub username: String,
    pub display_name: String,
    pub bio: Option<String>,
    pub gender: Option<String>,
    pub age: Option<u32>,
    pub zip_code: Option<String>,
    pub city: Option<String>,
    pub region: Option<String>,
    pub interests: Vec<String>,
    pub photo_url: Option<String>,
    pub last_seen_at: Option<DateTime<Utc>>,
}

impl From<User> for UserResponse {
    fn from(u: User) -> Self {
        let today = Utc::now().date_naive();
        Self {
            id: u.id,
            username: u.username,
            display_name: u.display_name,
            bio: u.bio,
            gender: u.gender,
            age: u.birth_date.and_then(|b| age_on(b, today)),
            zip_code: u.zip_code,
            city: u.city,
            region: u.region,
            interests: u.interests,
            photo_url: u.photo_path.as_deref().map(public_url),
            last_seen_at: u.last_seen_at,
        }
    }
}

/// The caller's own profile, including private fields
#[derive(Debug, Serialize)]
pub struct MeResponse {
    #[serde(flatten)]
    pub profile: UserResponse,
    pub email: String,
    pub birth_date: Option<NaiveDate>,
    pub created_at: DateTime<Utc>,
}

impl From<User> for MeResponse {
    fn from(u: User) -> Self {
        let email = u.email.clone();
        let birth_date = u.birth_date;
        let created_at = u.created_at;
        Self {
            profile: UserResponse::from(u),
            email,
            birth_date,
            created_at,
        }
    }
}

/// Another user's profile with how the caller relates to them
#[derive(Debug, Serialize)]
pub struct ProfileResponse {
    #[serde(flatten)]
    pub profile: UserResponse,
    pub relationship: Relationship,
}

/// Profile update request; absent fields are left unchanged
#[derive(Debug, Default, Deserialize)]
pub struct UpdateProfileRequest {
    pub display_name: Option<String>,
    pub bio: Option<String>,
    pub gender: Option<String>,
    pub birth_date: Option<NaiveDate>,
    pub zip_code: Option<String>,
    pub interests: Option<Vec<String>>,
}

/// Search query params
#[derive(Debug, Default, Deserialize)]
pub struct SearchParams {
    pub q: Option<String>,
    pub zip: Option<String>,
}

#[derive(Debug, Serialize)]
pub struct PhotoResponse {
    pub photo_url: String,
}

/// GET /api/users/me
async fn me(
    State(state): State<Arc<AppState>>,
    auth: AuthUser,
) -> Result<Json<MeResponse>, ApiError> {
    let user = UserRepo::new(&state.pool).get(auth.user_id).await?;
    Ok(Json(MeResponse::from(user)))
}

/// PATCH /api/users/me
async fn update_me(
    State(state): State<Arc<AppState>>,
    auth: AuthUser,
    Json(req): Json<UpdateProfileRequest>,
) -> Result<Json<MeResponse>, ApiError> {
    let mut update = ProfileUpdate {
        display_name: req
            .display_name
            .as_deref()
            .map(DisplayName::new)
            .transpose()?
            .map(|n| n.as_str().to_owned()),
        bio: req
            .bio
            .as_deref()
            .map(Bio::new)
            .transpose()?
            .map(|b| b.as_str().to_owned()),
        gender: req
            .gender
            .as_deref()
            .map(Gender::new)
            .transpose()?
            .map(|g| g.as_str().to_owned()),
        birth_date: req
            .birth_date
            .map(|d| BirthDate::new(d, Utc::now().date_naive()))
            .transpose()?
            .map(|d| d.date()),
        interests: req
            .interests
            .as_deref()
            .map(Interests::new)
            .transpose()?
            .map(Interests::into_vec),
        ..ProfileUpdate::default()
    };

    if let Some(raw) = req.zip_code.as_deref() {
        let zip = ZipCode::new(raw)?;
        let place = state.geo.lookup(&zip).await.map_err(|e| match e {
            GeoError::NotFound(_) => ApiError::Validation(ValidationError::InvalidFormat {
                field: "zip code",
                reason: "unknown zip code",
            }),
            other => ApiError::from(other),
        })?;
        update.zip_code = Some(zip.as_str().to_owned());
        update.city = Some(place.city);
        update.region = Some(place.region);
    }

    let user = UserRepo::new(&state.pool)
        .update_profile(auth.user_id, &update)
        .await?;
    tracing::debug!(user_id = %auth.user_id, "profile updated");
    Ok(Json(MeResponse::from(user)))
}

/// POST /api/users/me/photo (multipart field `photo`)
async fn upload_photo(
    State(state): State<Arc<AppState>>,
    auth: AuthUser,
    mut multipart: Multipart,
) -> Result<(StatusCode, Json<PhotoResponse>), ApiError> {
    let max = state.uploads.max_bytes();
    let mut upload = None;

    while let Some(field) = multipart.next_field().await.map_err(|e| multipart_error(e, max))? {
        if field.name() != Some("photo") {
            continue;
        }
        let content_type = field.content_type().unwrap_or_default().to_owned();
        let bytes = field.bytes().await.map_err(|e| multipart_error(e, max))?;
        upload = Some((content_type, bytes));
        break;
    }

    let (content_type, bytes) = upload.ok_or(ApiError::Validation(ValidationError::Empty {
        field: "photo",
    }))?;

    let relative = state
        .uploads
        .save_photo(auth.user_id, &content_type, &bytes)
        .await?;

    let previous = match UserRepo::new(&state.pool).set_photo(auth.user_id, &relative).await {
        Ok(previous) => previous,
        Err(e) => {
            // Don't leave an orphan file behind
            if let Err(cleanup) = state.uploads.remove(&relative).await {
                tracing::warn!(path = %relative, "failed to remove orphan upload: {}", cleanup);
            }
            return Err(e.into());
        }
    };

    if let Some(old) = previous.filter(|old| *old != relative) {
        if let Err(e) = state.uploads.remove(&old).await {
            tracing::warn!(path = %old, "failed to remove previous photo: {}", e);
        }
    }

    Ok((
        StatusCode::CREATED,
        Json(PhotoResponse {
            photo_url: public_url(&relative),
        }),
    ))
}

fn multipart_error(e: axum::extract::multipart::MultipartError, max: usize) -> ApiError {
    if e.status() == StatusCode::PAYLOAD_TOO_LARGE {
        ApiError::PayloadTooLarge { max }
    } else {
        ApiError::BadRequest(e.body_text())
    }
}

/// GET /api/users/{id}
async fn get_user(
    State(state): State<Arc<AppState>>,
    auth: AuthUser,
    ValidUuid(id): ValidUuid,
) -> Result<Json<ProfileResponse>, ApiError> {
    let user = UserRepo::new(&state.pool).get(id).await?;
    let relationship = if id == auth.user_id {
        Relationship::None
    } else {
        ConnectionRepo::new(&state.pool)
            .relationship(auth.user_id, id)
            .await?
            .0
    };

    Ok(Json(ProfileResponse {
        profile: UserResponse::from(user),
        relationship,
    }))
}

/// GET /api/users?q=&zip=
async fn search(
    State(state): State<Arc<AppState>>,
    auth: AuthUser,
    Query(params): Query<SearchParams>,
    Query(page): Query<PaginationParams>,
) -> Result<Json<Paginated<UserResponse>>, ApiError> {
    let zip = params
        .zip
        .as_deref()
        .filter(|z| !z.trim().is_empty())
        .map(ZipCode::new)
        .transpose()?;

    let result = UserRepo::new(&state.pool)
        .search(
            auth.user_id,
            params.q.as_deref(),
            zip.as_ref().map(ZipCode::as_str),
            Pagination::from(page),
        )
        .await?;

    Ok(Json(result.map(UserResponse::from)))
}

/// User routes. `photo_limit` caps the photo upload body.
pub fn router(photo_limit: usize) -> Router<Arc<AppState>> {
    Router::new()
        .route("/api/users", get(search))
        .route("/api/users/me", get(me).patch(update_me))
        .route(
            "/api/users/me/photo",
            post(upload_photo).layer(DefaultBodyLimit::max(photo_limit + MULTIPART_SLACK)),
        )
        .route("/api/users/{id}", get(get_user))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn user() -> User {
        User {
            id: Uuid::new_v4(),
            username: "sam".into(),
            email: "sam@example.test".into(),
            password_hash: "$argon2id$secret".into(),
            display_name: "Sam".into(),
            bio: None,
            gender: None,
            birth_date: NaiveDate::from_ymd_opt(1990, 1, 1),
            zip_code: Some("02139".into()),
            city: Some("Cambridge".into()),
            region: Some("MA".into()),
            interests: vec!["jazz".into()],
            photo_path: Some("u/p.png".into()),
            created_at: Utc::now(),
            updated_at: Utc::now(),
            last_seen_at: None,
        }
    }

    #[test]
    fn public_profile_hides_private_fields() {
        let json = serde_json::to_value(UserResponse::from(user())).unwrap();
        assert!(json.get("email").is_none());
        assert!(json.get("password_hash").is_none());
        assert!(json.get("birth_date").is_none());
        assert_eq!(json["photo_url"], "/uploads/u/p.png");
        assert!(json["age"].as_u64().unwrap() >= 36);
    }

    #[test]
    fn me_includes_email_but_not_hash() {
        let json = serde_json::to_value(MeResponse::from(user())).unwrap();
        assert_eq!(json["email"], "sam@example.test");
        assert_eq!(json["username"], "sam");
        assert!(json.get("password_hash").is_none());
    }

    #[test]
    fn search_defaults_to_first_page() {
        let uri: axum::http::Uri = "/api/users?q=sam".parse().unwrap();
        let Query(params) = Query::<SearchParams>::try_from_uri(&uri).unwrap();
        let Query(page) = Query::<PaginationParams>::try_from_uri(&uri).unwrap();
        let page = Pagination::from(page);

        assert_eq!(params.q.as_deref(), Some("sam"));
        assert!(params.zip.is_none());
        assert_eq!((page.page, page.per_page), (1, 20));
    }
}
