use axum::{
    Extension, Json,
    extract::{Multipart, Path, Query, State},
    http::StatusCode,
    response::IntoResponse,
};
use serde::Deserialize;
use tracing::warn;
use uuid::Uuid;

use quill_db::Database;
use quill_db::models::PostRow;
use quill_storage::ImageStore;
use quill_types::api::{MessageResponse, Pagination, PostListResponse, PostResponse};
use quill_types::models::Post;

use crate::auth::AppState;
use crate::error::{ApiError, ApiResult};
use crate::middleware::{AuthUser, MaybeUser};
use crate::{blocking, parse_timestamp, parse_uuid};

const DEFAULT_PAGE_SIZE: i64 = 6;
const MAX_PAGE_SIZE: i64 = 100;

#[derive(Debug, Default, Deserialize)]
pub struct PageQuery {
    #[serde(default, deserialize_with = "lenient_i64")]
    pub page: Option<i64>,
    #[serde(default, deserialize_with = "lenient_i64")]
    pub limit: Option<i64>,
}

/// `?page=` and `?page=abc` fall back to the default instead of rejecting
/// the request.
fn lenient_i64<'de, D>(deserializer: D) -> Result<Option<i64>, D::Error>
where
    D: serde::Deserializer<'de>,
{
    let raw = Option::<String>::deserialize(deserializer)?;
    Ok(raw.and_then(|s| s.parse().ok()))
}

/// Clamp caller-supplied paging: page at least 1, limit within 1..=100.
fn page_window(query: &PageQuery) -> (i64, i64) {
    let page = query.page.unwrap_or(1).max(1);
    let limit = query.limit.unwrap_or(DEFAULT_PAGE_SIZE).clamp(1, MAX_PAGE_SIZE);
    (page, limit)
}

// -- Handlers --

pub async fn list_posts(
    State(state): State<AppState>,
    Query(query): Query<PageQuery>,
    Extension(MaybeUser(viewer)): Extension<MaybeUser>,
) -> ApiResult<Json<PostListResponse>> {
    let (page, limit) = page_window(&query);
    let viewer_id = viewer.map(|u| u.id);

    let st = state.clone();
    let out = blocking(move || list_page(&st.db, page, limit, viewer_id)).await?;
    Ok(Json(out))
}

pub async fn my_posts(
    State(state): State<AppState>,
    Query(query): Query<PageQuery>,
    Extension(MaybeUser(viewer)): Extension<MaybeUser>,
) -> ApiResult<Json<PostListResponse>> {
    let user = viewer.ok_or(ApiError::Unauthorized)?;
    let (page, limit) = page_window(&query);

    let st = state.clone();
    let out = blocking(move || list_owned_page(&st.db, user.id, page, limit)).await?;
    Ok(Json(out))
}

pub async fn get_post(
    State(state): State<AppState>,
    Path(id): Path<String>,
    Extension(MaybeUser(viewer)): Extension<MaybeUser>,
) -> ApiResult<Json<PostResponse>> {
    let viewer_id = viewer.map(|u| u.id);
    let st = state.clone();
    let post = blocking(move || fetch_post(&st.db, &id, viewer_id)).await?;
    Ok(Json(post))
}

pub async fn create_post(
    State(state): State<AppState>,
    Extension(MaybeUser(viewer)): Extension<MaybeUser>,
    multipart: Multipart,
) -> ApiResult<impl IntoResponse> {
    let user = viewer.ok_or(ApiError::Unauthorized)?;
    let form = read_post_form(multipart).await?;
    let post = create_from_form(&state, form, &user).await?;
    Ok((StatusCode::CREATED, Json(post)))
}

pub async fn update_post(
    State(state): State<AppState>,
    Path(id): Path<String>,
    Extension(MaybeUser(viewer)): Extension<MaybeUser>,
    multipart: Multipart,
) -> ApiResult<Json<PostResponse>> {
    let user = viewer.ok_or(ApiError::Unauthorized)?;
    let form = read_post_form(multipart).await?;
    let post = update_from_form(&state, &id, form, &user).await?;
    Ok(Json(post))
}

pub async fn delete_post(
    State(state): State<AppState>,
    Path(id): Path<String>,
    Extension(MaybeUser(viewer)): Extension<MaybeUser>,
) -> ApiResult<Json<MessageResponse>> {
    let user = viewer.ok_or(ApiError::Unauthorized)?;
    remove_post(&state, &id, user.id).await?;
    Ok(Json(MessageResponse {
        message: "Blog deleted successfully".into(),
    }))
}

// -- Multipart form --

#[derive(Debug, Default)]
pub(crate) struct PostForm {
    pub title: String,
    pub description: String,
    pub content: String,
    pub image: Option<ImageUpload>,
    pub image_url: Option<String>,
}

#[derive(Debug)]
pub(crate) struct ImageUpload {
    pub original_name: String,
    pub data: Vec<u8>,
}

async fn read_post_form(mut multipart: Multipart) -> ApiResult<PostForm> {
    let mut form = PostForm::default();

    while let Some(field) = multipart
        .next_field()
        .await
        .map_err(|e| ApiError::Validation(format!("Invalid multipart payload: {e}")))?
    {
        let name = field.name().unwrap_or_default().to_string();
        match name.as_str() {
            "title" => form.title = read_text(field).await?,
            "description" => form.description = read_text(field).await?,
            "content" => form.content = read_text(field).await?,
            "image_url" => form.image_url = Some(read_text(field).await?),
            "image" => {
                let original_name = field.file_name().unwrap_or("upload").to_string();
                let data = field
                    .bytes()
                    .await
                    .map_err(|e| ApiError::Validation(format!("Invalid image upload: {e}")))?;
                if !data.is_empty() {
                    form.image = Some(ImageUpload {
                        original_name,
                        data: data.to_vec(),
                    });
                }
            }
            // Unknown fields are ignored, like the original form parser.
            _ => {}
        }
    }

    Ok(form)
}

async fn read_text(field: axum::extract::multipart::Field<'_>) -> ApiResult<String> {
    field
        .text()
        .await
        .map_err(|e| ApiError::Validation(format!("Invalid multipart field: {e}")))
}

fn validate_required(form: &PostForm) -> ApiResult<()> {
    if form.title.trim().is_empty()
        || form.description.trim().is_empty()
        || form.content.trim().is_empty()
    {
        return Err(ApiError::Validation(
            "Title, description, and content are required".into(),
        ));
    }
    Ok(())
}

async fn store_image(images: &dyn ImageStore, upload: ImageUpload) -> ApiResult<String> {
    let filename = quill_storage::unique_filename(
        "image",
        &upload.original_name,
        chrono::Utc::now().timestamp_millis(),
    );
    Ok(images.save(&filename, &upload.data).await?)
}

// -- Service flows --

pub(crate) async fn create_from_form(
    state: &AppState,
    form: PostForm,
    user: &AuthUser,
) -> ApiResult<PostResponse> {
    validate_required(&form)?;
    let PostForm {
        title,
        description,
        content,
        image,
        ..
    } = form;

    // A create only carries an image if one was uploaded.
    let image_url = match image {
        Some(upload) => Some(store_image(state.images.as_ref(), upload).await?),
        None => None,
    };

    let st = state.clone();
    let owner = user.id;
    blocking(move || {
        let id = Uuid::new_v4().to_string();
        st.db.insert_post(
            &id,
            &title,
            &description,
            &content,
            image_url.as_deref(),
            &owner.to_string(),
        )?;
        fetch_post(&st.db, &id, Some(owner))
    })
    .await
}

pub(crate) async fn update_from_form(
    state: &AppState,
    id: &str,
    form: PostForm,
    user: &AuthUser,
) -> ApiResult<PostResponse> {
    validate_required(&form)?;

    let st = state.clone();
    let pid = id.to_string();
    let owner = user.id;
    blocking(move || ensure_owned(&st.db, &pid, owner).map(|_| ())).await?;

    let PostForm {
        title,
        description,
        content,
        image,
        image_url,
    } = form;

    // A fresh upload wins; otherwise the form's image_url field is taken
    // verbatim, so omitting it clears the reference.
    let image_url = match image {
        Some(upload) => Some(store_image(state.images.as_ref(), upload).await?),
        None => image_url,
    };

    let st = state.clone();
    let pid = id.to_string();
    blocking(move || {
        st.db
            .update_post(&pid, &title, &description, &content, image_url.as_deref())?;
        fetch_post(&st.db, &pid, Some(owner))
    })
    .await
}

pub(crate) async fn remove_post(state: &AppState, id: &str, owner: Uuid) -> ApiResult<()> {
    let st = state.clone();
    let pid = id.to_string();
    let row = blocking(move || ensure_owned(&st.db, &pid, owner)).await?;

    // Best-effort: a missing or undeletable file never blocks the row delete.
    if let Some(image_url) = &row.image_url {
        if let Err(e) = state.images.delete(image_url).await {
            warn!("Failed to delete image {}: {}", image_url, e);
        }
    }

    let st = state.clone();
    let pid = id.to_string();
    blocking(move || {
        st.db.delete_post(&pid)?;
        Ok(())
    })
    .await
}

// -- Service queries (synchronous; run under `blocking`) --

pub fn list_page(
    db: &Database,
    page: i64,
    limit: i64,
    viewer: Option<Uuid>,
) -> ApiResult<PostListResponse> {
    let total_count = db.count_posts()?;
    let rows = db.list_posts(limit, (page - 1) * limit)?;

    Ok(PostListResponse {
        blogs: rows
            .into_iter()
            .map(|row| PostResponse::for_viewer(post_from_row(row), viewer))
            .collect(),
        pagination: pagination(total_count, page, limit),
    })
}

pub fn list_owned_page(
    db: &Database,
    owner: Uuid,
    page: i64,
    limit: i64,
) -> ApiResult<PostListResponse> {
    let owner_id = owner.to_string();
    let total_count = db.count_posts_by_author(&owner_id)?;
    let rows = db.list_posts_by_author(&owner_id, limit, (page - 1) * limit)?;

    Ok(PostListResponse {
        blogs: rows
            .into_iter()
            .map(|row| PostResponse::for_viewer(post_from_row(row), Some(owner)))
            .collect(),
        pagination: pagination(total_count, page, limit),
    })
}

pub fn fetch_post(db: &Database, id: &str, viewer: Option<Uuid>) -> ApiResult<PostResponse> {
    let row = db.get_post(id)?.ok_or(ApiError::PostNotFound)?;
    Ok(PostResponse::for_viewer(post_from_row(row), viewer))
}

/// Existence before ownership: a missing post is 404 even for strangers,
/// and only the owner may get past this for mutation.
pub fn ensure_owned(db: &Database, id: &str, owner: Uuid) -> ApiResult<PostRow> {
    let row = db.get_post(id)?.ok_or(ApiError::PostNotFound)?;
    if row.author_id != owner.to_string() {
        return Err(ApiError::Forbidden);
    }
    Ok(row)
}

fn pagination(total_count: i64, page: i64, limit: i64) -> Pagination {
    Pagination {
        total_count,
        total_pages: (total_count as u64).div_ceil(limit as u64) as i64,
        current_page: page,
        page_size: limit,
    }
}

fn post_from_row(row: PostRow) -> Post {
    Post {
        id: parse_uuid(&row.id, "post id"),
        title: row.title,
        description: row.description,
        content: row.content,
        image_url: row.image_url,
        author_id: parse_uuid(&row.author_id, "post author_id"),
        author_name: row.author_name,
        created_at: parse_timestamp(&row.created_at, "post created_at"),
        updated_at: parse_timestamp(&row.updated_at, "post updated_at"),
    }
}
