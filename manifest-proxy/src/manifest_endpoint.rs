use axum::extract::{Path, State};
use axum::http::StatusCode;
use axum::Json;
use tracing::instrument;

use crate::api::FlagError;
use crate::client::ClientError;
use crate::flag_definitions::{FeatureFlag, UpdateFeatureFlagBody};
use crate::manifest::{
    ArchiveResponse, CreateFlagRequest, Manifest, ManifestFlagResponse, UpdateFlagRequest,
};
use crate::metrics_consts::{
    FLAGS_CREATED_COUNTER, FLAGS_DELETED_COUNTER, FLAGS_UPDATED_COUNTER, FLAG_READS_COUNTER,
    MANIFEST_READS_COUNTER,
};
use crate::router;
use crate::transformer::{
    standard_to_vendor_create, standard_to_vendor_update, validate_variant_weights,
    vendor_to_manifest, vendor_to_standard, TypeDetectionChain,
};

fn flag_error(key: &str, err: ClientError) -> FlagError {
    match err {
        ClientError::NotFound(_) => FlagError::FlagNotFound(key.to_string()),
        err if err.is_duplicate_key() => FlagError::FlagAlreadyExists(key.to_string()),
        err => FlagError::PostHogError(err),
    }
}

async fn fetch_flag(state: &router::State, key: &str) -> Result<FeatureFlag, FlagError> {
    state
        .client
        .get_flag_by_key(key)
        .await
        .map_err(|e| flag_error(key, e))
}

fn flag_response(state: &router::State, flag: &FeatureFlag) -> ManifestFlagResponse {
    ManifestFlagResponse {
        flag: vendor_to_standard(flag, &state.config.type_coercion),
        updated_at: flag.updated_at,
    }
}

/// Every flag in the project, as a manifest.
#[instrument(skip_all)]
pub async fn get_manifest(State(state): State<router::State>) -> Result<Json<Manifest>, FlagError> {
    let flags = state.client.list_flags().await?;
    let manifest = vendor_to_manifest(&flags, &state.config.type_coercion);

    metrics::counter!(MANIFEST_READS_COUNTER).increment(1);
    tracing::debug!("serving manifest with {} flags", manifest.flags.len());

    Ok(Json(manifest))
}

/// Archived (inactive) flags are reported as missing.
#[instrument(skip_all, fields(key))]
pub async fn get_flag(
    State(state): State<router::State>,
    Path(key): Path<String>,
) -> Result<Json<ManifestFlagResponse>, FlagError> {
    tracing::Span::current().record("key", key.as_str());

    let flag = fetch_flag(&state, &key).await?;
    if !flag.active || flag.deleted {
        return Err(FlagError::FlagNotFound(key));
    }

    metrics::counter!(FLAG_READS_COUNTER).increment(1);

    Ok(Json(flag_response(&state, &flag)))
}

#[instrument(skip_all, fields(key))]
pub async fn create_flag(
    State(state): State<router::State>,
    Json(request): Json<CreateFlagRequest>,
) -> Result<(StatusCode, Json<ManifestFlagResponse>), FlagError> {
    tracing::Span::current().record("key", request.key.as_str());

    if !request.flag_type.accepts(&request.default_value) {
        return Err(FlagError::InvalidDefaultValue(request.flag_type));
    }
    if !request.variants.is_empty() {
        validate_variant_weights(&request.variants)?;
    }

    let body = standard_to_vendor_create(&request, state.config.default_rollout_percentage);
    let created = state
        .client
        .create_flag(&body)
        .await
        .map_err(|e| flag_error(&request.key, e))?;

    metrics::counter!(FLAGS_CREATED_COUNTER).increment(1);
    tracing::info!("created flag {} with id {}", created.key, created.id);

    Ok((StatusCode::CREATED, Json(flag_response(&state, &created))))
}

#[instrument(skip_all, fields(key))]
pub async fn update_flag(
    State(state): State<router::State>,
    Path(key): Path<String>,
    Json(request): Json<UpdateFlagRequest>,
) -> Result<Json<ManifestFlagResponse>, FlagError> {
    tracing::Span::current().record("key", key.as_str());

    if let Some(variants) = &request.variants {
        validate_variant_weights(variants)?;
    }
    if let (Some(flag_type), Some(default_value)) = (request.flag_type, &request.default_value) {
        if !flag_type.accepts(default_value) {
            return Err(FlagError::InvalidDefaultValue(flag_type));
        }
    }

    let existing = fetch_flag(&state, &key).await?;
    if let (None, Some(default_value)) = (request.flag_type, &request.default_value) {
        let (flag_type, _) = TypeDetectionChain::new(state.config.type_coercion).detect(&existing);
        if !flag_type.accepts(default_value) {
            return Err(FlagError::InvalidDefaultValue(flag_type));
        }
    }

    let body = standard_to_vendor_update(&request, &existing, &state.config.type_coercion);
    if body.is_empty() {
        return Ok(Json(flag_response(&state, &existing)));
    }

    let updated = state
        .client
        .update_flag(existing.id, &body)
        .await
        .map_err(|e| flag_error(&key, e))?;

    metrics::counter!(FLAGS_UPDATED_COUNTER).increment(1);

    Ok(Json(flag_response(&state, &updated)))
}

/// Archives the flag (turns it off) or removes it, depending on configuration.
#[instrument(skip_all, fields(key))]
pub async fn delete_flag(
    State(state): State<router::State>,
    Path(key): Path<String>,
) -> Result<Json<ArchiveResponse>, FlagError> {
    tracing::Span::current().record("key", key.as_str());

    let existing = fetch_flag(&state, &key).await?;

    let response = if state.config.archive_instead_of_delete {
        let archive = UpdateFeatureFlagBody {
            active: Some(false),
            ..Default::default()
        };
        let archived = state
            .client
            .update_flag(existing.id, &archive)
            .await
            .map_err(|e| flag_error(&key, e))?;

        ArchiveResponse {
            message: format!(
                "Flag \"{key}\" archived. Restore it using your management interface if needed."
            ),
            archived_at: archived.updated_at,
        }
    } else {
        state
            .client
            .delete_flag(existing.id)
            .await
            .map_err(|e| flag_error(&key, e))?;

        ArchiveResponse {
            message: format!("Flag \"{key}\" deleted successfully."),
            archived_at: None,
        }
    };

    metrics::counter!(FLAGS_DELETED_COUNTER).increment(1);
    tracing::info!("{}", response.message);

    Ok(Json(response))
}
