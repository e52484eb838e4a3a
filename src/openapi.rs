use crate::error::ApiErrorBody;
use crate::models::{User, Video};
use crate::response::UserResponse;
use utoipa::OpenApi;

#[derive(OpenApi)]
#[openapi(
    paths(
        crate::routes::register,
    ),
    components(schemas(
        User, Video, UserResponse, ApiErrorBody,
        crate::routes::RegisterRequest
    )),
    tags(
        (name = "users", description = "User registration"),
    )
)]
pub struct ApiDoc;
