use axum::{extract::State, http::StatusCode, Json};
use chrono::Utc;
use uuid::Uuid;

use crate::{
    dto::{FeedbackRequest, FeedbackResponse},
    error::ApiResult,
    security::{
        sanitize, validate_field, validate_no_threats, validate_required_field,
        validate_section, validate_uuid, FieldKind, JsonBody, SecurityContext,
    },
    SecurityGateway,
};

/// Accept a feedback message about an exam question.
///
/// Free text is checked for adversarial content and echoed back HTML-escaped.
pub async fn submit(
    State(gateway): State<SecurityGateway>,
    SecurityContext(ctx): SecurityContext,
    JsonBody(payload): JsonBody<FeedbackRequest>,
) -> ApiResult<(StatusCode, Json<FeedbackResponse>)> {
    let validator = &gateway.validator;

    let section = validator.check(
        &ctx,
        "section",
        validate_no_threats(payload.section.as_deref().unwrap_or_default())
            .and_then(validate_section),
    )?;
    let subject = validator.check(
        &ctx,
        "subject",
        validate_required_field(payload.subject.as_deref(), FieldKind::Subject),
    )?;
    let body = validator.check(
        &ctx,
        "body",
        validate_required_field(payload.body.as_deref(), FieldKind::Body),
    )?;
    let email = validator.check_optional(&ctx, "email", payload.email.as_deref(), |e| {
        validate_field(e, FieldKind::Email)
    })?;
    let question_id =
        validator.check_optional(&ctx, "questionId", payload.question_id.as_deref(), |q| {
            validate_no_threats(q).and_then(validate_uuid)
        })?;

    tracing::info!(section = %section, endpoint = %ctx.endpoint, "Feedback received");

    Ok((
        StatusCode::CREATED,
        Json(FeedbackResponse {
            id: Uuid::new_v4(),
            section,
            subject: sanitize(&subject),
            body: sanitize(&body),
            email,
            question_id,
            received_at: Utc::now(),
        }),
    ))
}
