// src/handlers.rs
use crate::{AppState, editor::EditorSession, errors::PixshopError, models::*};
use actix_multipart::Multipart;
use actix_web::http::header::{ContentDisposition, DispositionParam, DispositionType};
use actix_web::{Error, HttpResponse, web};
use futures_util::TryStreamExt;
use log::debug;
use serde::Deserialize;
use uuid::Uuid;

#[derive(Debug, Deserialize)]
pub struct ToolRequest {
    pub tool: Tool,
}

#[derive(Debug, Deserialize)]
pub struct HotspotRequest {
    pub x: f64,
    pub y: f64,
    pub displayed: DisplaySize,
}

#[derive(Debug, Deserialize)]
pub struct CropSelectionRequest {
    pub rect: DisplayRect,
    pub displayed: DisplaySize,
}

#[derive(Debug, Deserialize)]
pub struct IndexRequest {
    pub index: usize,
}

#[derive(Debug, Deserialize)]
pub struct BatchApplyRequest {
    pub operation: BatchOperation,
    pub prompt: String,
}

#[derive(Debug, Deserialize)]
pub struct VideoRequest {
    pub prompt: String,
}

pub fn configure(cfg: &mut web::ServiceConfig) {
    cfg.service(
        web::scope("/api/v1")
            .route("/sessions", web::post().to(create_session))
            .service(
                web::scope("/sessions/{session_id}")
                    .route("", web::get().to(get_session))
                    .route("", web::delete().to(delete_session))
                    .route("/tool", web::post().to(select_tool))
                    .route("/hotspot", web::post().to(set_hotspot))
                    .route("/crop-selection", web::post().to(set_crop_selection))
                    .route("/crop", web::post().to(apply_crop))
                    .route("/generate", web::post().to(generate))
                    .route("/variations/preview", web::post().to(preview_variation))
                    .route("/variations/confirm", web::post().to(confirm_variation))
                    .route("/variations/cancel", web::post().to(cancel_variations))
                    .route("/undo", web::post().to(undo))
                    .route("/redo", web::post().to(redo))
                    .route("/reset", web::post().to(reset))
                    .route("/batch/active", web::post().to(set_active))
                    .route("/batch/apply", web::post().to(batch_apply))
                    .route("/reference", web::post().to(upload_reference))
                    .route("/characters", web::post().to(upload_characters))
                    .route("/characters", web::delete().to(clear_characters))
                    .route("/video", web::post().to(generate_video))
                    .route("/video/extend", web::post().to(extend_video))
                    .route("/video/extend/cancel", web::post().to(cancel_extend))
                    .route("/video/back", web::post().to(back_to_editor))
                    .route("/error/dismiss", web::post().to(dismiss_error))
                    .route("/blobs/{token}", web::get().to(get_blob))
                    .route("/download", web::get().to(download))
                    .route("/original", web::get().to(original)),
            ),
    );
}

async fn read_images(
    payload: &mut Multipart,
    data: &AppState,
) -> Result<Vec<ImageResource>, Error> {
    let mut images = Vec::new();

    while let Some(mut field) = payload.try_next().await? {
        let content_disposition = field.content_disposition();
        let filename = content_disposition
            .get_filename()
            .ok_or_else(|| PixshopError::validation("No filename provided"))?
            .to_string();

        let content_type = field
            .content_type()
            .map(|ct| ct.to_string())
            .unwrap_or_else(|| "application/octet-stream".to_string());

        let mut image_data = Vec::new();
        while let Some(chunk) = field.try_next().await? {
            image_data.extend_from_slice(&chunk);
        }

        data.image_processor.validate_image(&image_data)?;
        let mime_type = data.image_processor.detect_mime(&image_data, &content_type);

        images.push(ImageResource::new(filename, mime_type, image_data));
    }

    Ok(images)
}

fn view(session: &EditorSession) -> HttpResponse {
    HttpResponse::Ok().json(session.view())
}

/// Local validation problems are returned as 400s; anything else is already in the session.
fn view_or_validation(
    session: &EditorSession,
    result: Result<(), PixshopError>,
) -> Result<HttpResponse, Error> {
    match result {
        Err(err @ PixshopError::Validation(_)) => Err(err.into()),
        _ => Ok(view(session)),
    }
}

pub async fn create_session(
    mut payload: Multipart,
    data: web::Data<AppState>,
) -> Result<HttpResponse, Error> {
    let images = read_images(&mut payload, &data).await?;
    let session = data.session_store.create(images).await?;
    let session = session.lock().await;
    Ok(HttpResponse::Created().json(session.view()))
}

pub async fn get_session(
    path: web::Path<Uuid>,
    data: web::Data<AppState>,
) -> Result<HttpResponse, Error> {
    let session = data.session_store.get(&path.into_inner()).await?;
    let session = session.lock().await;
    Ok(view(&session))
}

pub async fn delete_session(
    path: web::Path<Uuid>,
    data: web::Data<AppState>,
) -> Result<HttpResponse, Error> {
    data.session_store.remove(&path.into_inner()).await?;
    Ok(HttpResponse::NoContent().finish())
}

pub async fn select_tool(
    path: web::Path<Uuid>,
    data: web::Data<AppState>,
    body: web::Json<ToolRequest>,
) -> Result<HttpResponse, Error> {
    let session = data.session_store.get(&path.into_inner()).await?;
    let mut session = session.lock().await;
    session.select_tool(body.tool);
    Ok(view(&session))
}

pub async fn set_hotspot(
    path: web::Path<Uuid>,
    data: web::Data<AppState>,
    body: web::Json<HotspotRequest>,
) -> Result<HttpResponse, Error> {
    let session = data.session_store.get(&path.into_inner()).await?;
    let mut session = session.lock().await;

    let image = session
        .current_image()
        .ok_or_else(|| PixshopError::validation("Please upload an image first."))?;
    let natural = data.image_processor.natural_size(image)?;
    let hotspot = data
        .image_processor
        .map_point(DisplayPoint { x: body.x, y: body.y }, body.displayed, natural)?;
    session.set_hotspot(hotspot)?;
    Ok(view(&session))
}

pub async fn set_crop_selection(
    path: web::Path<Uuid>,
    data: web::Data<AppState>,
    body: web::Json<CropSelectionRequest>,
) -> Result<HttpResponse, Error> {
    let session = data.session_store.get(&path.into_inner()).await?;
    let mut session = session.lock().await;

    let image = session
        .current_image()
        .ok_or_else(|| PixshopError::validation("Please upload an image first."))?;
    let natural = data.image_processor.natural_size(image)?;
    let rect = data
        .image_processor
        .map_rect(body.rect, body.displayed, natural)?;
    session.set_crop_selection(rect)?;
    Ok(view(&session))
}

pub async fn apply_crop(
    path: web::Path<Uuid>,
    data: web::Data<AppState>,
) -> Result<HttpResponse, Error> {
    let session = data.session_store.get(&path.into_inner()).await?;
    let mut session = session.lock().await;
    let result = data.workflow.apply_crop(&mut session, &data.image_processor);
    view_or_validation(&session, result)
}

/// Validates synchronously, then runs the backend calls in the background.
/// Clients poll the session view until `loading` clears.
pub async fn generate(
    path: web::Path<Uuid>,
    data: web::Data<AppState>,
    body: web::Json<EditOperation>,
) -> Result<HttpResponse, Error> {
    let shared = data.session_store.get(&path.into_inner()).await?;
    let (prepared, response) = {
        let mut session = shared.lock().await;
        let prepared = data
            .workflow
            .prepare_generation(&mut session, body.into_inner())?;
        (prepared, HttpResponse::Accepted().json(session.view()))
    };

    let workflow = data.workflow.clone();
    actix_web::rt::spawn(async move {
        if let Err(e) = workflow.run_generation(&shared, prepared).await {
            debug!("generation ended with error: {}", e);
        }
    });
    Ok(response)
}

pub async fn preview_variation(
    path: web::Path<Uuid>,
    data: web::Data<AppState>,
    body: web::Json<IndexRequest>,
) -> Result<HttpResponse, Error> {
    let session = data.session_store.get(&path.into_inner()).await?;
    let mut session = session.lock().await;
    session.preview_variation(body.index)?;
    Ok(view(&session))
}

pub async fn confirm_variation(
    path: web::Path<Uuid>,
    data: web::Data<AppState>,
    body: web::Json<IndexRequest>,
) -> Result<HttpResponse, Error> {
    let session = data.session_store.get(&path.into_inner()).await?;
    let mut session = session.lock().await;
    session.confirm_variation(body.index)?;
    Ok(view(&session))
}

pub async fn cancel_variations(
    path: web::Path<Uuid>,
    data: web::Data<AppState>,
) -> Result<HttpResponse, Error> {
    let session = data.session_store.get(&path.into_inner()).await?;
    let mut session = session.lock().await;
    session.cancel_variations();
    Ok(view(&session))
}

pub async fn undo(path: web::Path<Uuid>, data: web::Data<AppState>) -> Result<HttpResponse, Error> {
    let session = data.session_store.get(&path.into_inner()).await?;
    let mut session = session.lock().await;
    session.undo()?;
    Ok(view(&session))
}

pub async fn redo(path: web::Path<Uuid>, data: web::Data<AppState>) -> Result<HttpResponse, Error> {
    let session = data.session_store.get(&path.into_inner()).await?;
    let mut session = session.lock().await;
    session.redo()?;
    Ok(view(&session))
}

pub async fn reset(path: web::Path<Uuid>, data: web::Data<AppState>) -> Result<HttpResponse, Error> {
    let session = data.session_store.get(&path.into_inner()).await?;
    let mut session = session.lock().await;
    session.reset_to_original()?;
    Ok(view(&session))
}

pub async fn set_active(
    path: web::Path<Uuid>,
    data: web::Data<AppState>,
    body: web::Json<IndexRequest>,
) -> Result<HttpResponse, Error> {
    let session = data.session_store.get(&path.into_inner()).await?;
    let mut session = session.lock().await;
    session.set_active(body.index)?;
    Ok(view(&session))
}

pub async fn batch_apply(
    path: web::Path<Uuid>,
    data: web::Data<AppState>,
    body: web::Json<BatchApplyRequest>,
) -> Result<HttpResponse, Error> {
    let shared = data.session_store.get(&path.into_inner()).await?;
    let BatchApplyRequest { operation, prompt } = body.into_inner();
    let (prepared, response) = {
        let mut session = shared.lock().await;
        let prepared = data.workflow.prepare_batch(&mut session, operation, prompt)?;
        (prepared, HttpResponse::Accepted().json(session.view()))
    };

    let workflow = data.workflow.clone();
    actix_web::rt::spawn(async move {
        if let Err(e) = workflow.run_batch(&shared, prepared).await {
            debug!("batch apply ended with error: {}", e);
        }
    });
    Ok(response)
}

pub async fn upload_reference(
    path: web::Path<Uuid>,
    mut payload: Multipart,
    data: web::Data<AppState>,
) -> Result<HttpResponse, Error> {
    let session = data.session_store.get(&path.into_inner()).await?;
    let mut images = read_images(&mut payload, &data).await?;
    if images.is_empty() {
        return Err(PixshopError::validation("Please upload a reference image.").into());
    }
    let mut session = session.lock().await;
    session.set_reference_image(images.remove(0));
    Ok(view(&session))
}

pub async fn upload_characters(
    path: web::Path<Uuid>,
    mut payload: Multipart,
    data: web::Data<AppState>,
) -> Result<HttpResponse, Error> {
    let session = data.session_store.get(&path.into_inner()).await?;
    let images = read_images(&mut payload, &data).await?;
    let mut session = session.lock().await;
    session.add_character_images(images);
    Ok(view(&session))
}

pub async fn clear_characters(
    path: web::Path<Uuid>,
    data: web::Data<AppState>,
) -> Result<HttpResponse, Error> {
    let session = data.session_store.get(&path.into_inner()).await?;
    let mut session = session.lock().await;
    session.clear_character_images();
    Ok(view(&session))
}

pub async fn generate_video(
    path: web::Path<Uuid>,
    data: web::Data<AppState>,
    body: web::Json<VideoRequest>,
) -> Result<HttpResponse, Error> {
    let shared = data.session_store.get(&path.into_inner()).await?;
    let (prepared, response) = {
        let mut session = shared.lock().await;
        let prepared = data
            .workflow
            .prepare_video(&mut session, body.into_inner().prompt)?;
        (prepared, HttpResponse::Accepted().json(session.view()))
    };

    let workflow = data.workflow.clone();
    actix_web::rt::spawn(async move {
        if let Err(e) = workflow.run_video(&shared, prepared).await {
            debug!("video generation ended with error: {}", e);
        }
    });
    Ok(response)
}

pub async fn extend_video(
    path: web::Path<Uuid>,
    data: web::Data<AppState>,
) -> Result<HttpResponse, Error> {
    let shared = data.session_store.get(&path.into_inner()).await?;
    let (prepared, response) = {
        let mut session = shared.lock().await;
        let prepared = data.workflow.prepare_extend(&mut session)?;
        (prepared, HttpResponse::Accepted().json(session.view()))
    };

    let workflow = data.workflow.clone();
    actix_web::rt::spawn(async move {
        if let Err(e) = workflow.run_extend(shared, prepared).await {
            debug!("frame extraction ended with error: {}", e);
        }
    });
    Ok(response)
}

pub async fn cancel_extend(
    path: web::Path<Uuid>,
    data: web::Data<AppState>,
) -> Result<HttpResponse, Error> {
    let session = data.session_store.get(&path.into_inner()).await?;
    let mut guard = session.lock().await;
    let session = &mut *guard;
    session.video.cancel_extend(&mut session.urls)?;
    Ok(view(session))
}

pub async fn back_to_editor(
    path: web::Path<Uuid>,
    data: web::Data<AppState>,
) -> Result<HttpResponse, Error> {
    let session = data.session_store.get(&path.into_inner()).await?;
    let mut guard = session.lock().await;
    let session = &mut *guard;
    session.video.back_to_editor(&mut session.urls)?;
    Ok(view(session))
}

pub async fn dismiss_error(
    path: web::Path<Uuid>,
    data: web::Data<AppState>,
) -> Result<HttpResponse, Error> {
    let session = data.session_store.get(&path.into_inner()).await?;
    let mut session = session.lock().await;
    session.dismiss_error();
    Ok(view(&session))
}

pub async fn get_blob(
    path: web::Path<(Uuid, Uuid)>,
    data: web::Data<AppState>,
) -> Result<HttpResponse, Error> {
    let (session_id, token) = path.into_inner();
    let session = data.session_store.get(&session_id).await?;
    let session = session.lock().await;
    let (mime_type, bytes) = session
        .resolve_blob(&token)
        .ok_or_else(|| PixshopError::NotFound(format!("display url {}", token)))?;

    Ok(HttpResponse::Ok().content_type(mime_type).body(bytes))
}

pub async fn download(
    path: web::Path<Uuid>,
    data: web::Data<AppState>,
) -> Result<HttpResponse, Error> {
    let session = data.session_store.get(&path.into_inner()).await?;
    let session = session.lock().await;
    let image = session
        .current_image()
        .ok_or_else(|| PixshopError::NotFound("no image loaded".to_string()))?;
    Ok(attachment(image, &format!("edited-{}", image.name)))
}

pub async fn original(
    path: web::Path<Uuid>,
    data: web::Data<AppState>,
) -> Result<HttpResponse, Error> {
    let session = data.session_store.get(&path.into_inner()).await?;
    let session = session.lock().await;
    let image = session
        .original_image()
        .ok_or_else(|| PixshopError::NotFound("no image loaded".to_string()))?;
    Ok(HttpResponse::Ok()
        .content_type(image.mime_type.clone())
        .body(image.data.clone()))
}

fn attachment(image: &ImageResource, filename: &str) -> HttpResponse {
    HttpResponse::Ok()
        .content_type(image.mime_type.clone())
        .insert_header(ContentDisposition {
            disposition: DispositionType::Attachment,
            parameters: vec![DispositionParam::Filename(filename.to_string())],
        })
        .body(image.data.clone())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::editor::session::CommitTarget;
    use crate::editor::Workflow;
    use crate::editor::workflow::tests::{ScriptedBackend, ScriptedFrames, test_config};
    use crate::services::image_processor::tests::png_bytes;
    use crate::services::{ImageProcessor, SessionStore};
    use actix_web::{App, http::StatusCode, test};
    use std::sync::Arc;

    fn app_state() -> AppState {
        let config = test_config();
        AppState {
            session_store: Arc::new(SessionStore::new()),
            workflow: Arc::new(Workflow::new(
                Arc::new(ScriptedBackend::default()),
                Arc::new(ScriptedFrames { fail: false }),
                &config,
            )),
            image_processor: Arc::new(ImageProcessor::new(config.max_dimension)),
        }
    }

    async fn seeded(state: &AppState) -> Uuid {
        let session = state
            .session_store
            .create(vec![ImageResource::new("cat.png", "image/png", png_bytes(40, 20))])
            .await
            .unwrap();
        let id = session.lock().await.id();
        id
    }

    #[actix_web::test]
    async fn session_view_and_unknown_session() {
        let state = app_state();
        let id = seeded(&state).await;
        let app = test::init_service(App::new().app_data(web::Data::new(state)).configure(configure)).await;

        let req = test::TestRequest::get()
            .uri(&format!("/api/v1/sessions/{}", id))
            .to_request();
        let body: serde_json::Value = test::call_and_read_body_json(&app, req).await;
        assert_eq!(body["mode"], "single");
        assert_eq!(body["history"]["length"], 1);
        assert_eq!(body["loading"], false);

        let req = test::TestRequest::get()
            .uri(&format!("/api/v1/sessions/{}", Uuid::new_v4()))
            .to_request();
        let resp = test::call_service(&app, req).await;
        assert_eq!(resp.status(), StatusCode::NOT_FOUND);
    }

    #[actix_web::test]
    async fn hotspot_is_mapped_to_natural_pixels() {
        let state = app_state();
        let id = seeded(&state).await;
        let app = test::init_service(App::new().app_data(web::Data::new(state)).configure(configure)).await;

        let req = test::TestRequest::post()
            .uri(&format!("/api/v1/sessions/{}/hotspot", id))
            .set_json(serde_json::json!({
                "x": 10.0,
                "y": 5.0,
                "displayed": { "width": 20.0, "height": 10.0 }
            }))
            .to_request();
        let body: serde_json::Value = test::call_and_read_body_json(&app, req).await;
        assert_eq!(body["hotspot"], serde_json::json!({ "x": 20, "y": 10 }));

        let req = test::TestRequest::post()
            .uri(&format!("/api/v1/sessions/{}/hotspot", id))
            .set_json(serde_json::json!({
                "point": { "x": 10.0, "y": 5.0 },
                "displayed": { "width": 20.0, "height": 10.0 }
            }))
            .to_request();
        let resp = test::call_service(&app, req).await;
        assert_eq!(resp.status(), StatusCode::BAD_REQUEST);
    }

    #[actix_web::test]
    async fn invalid_generation_is_bad_request() {
        let state = app_state();
        let id = seeded(&state).await;
        let app = test::init_service(App::new().app_data(web::Data::new(state)).configure(configure)).await;

        let req = test::TestRequest::post()
            .uri(&format!("/api/v1/sessions/{}/generate", id))
            .set_json(serde_json::json!({ "type": "filter", "prompt": "" }))
            .to_request();
        let resp = test::call_service(&app, req).await;
        assert_eq!(resp.status(), StatusCode::BAD_REQUEST);
    }

    #[actix_web::test]
    async fn generation_runs_in_background_then_opens_gate() {
        let state = app_state();
        let id = seeded(&state).await;
        let store = state.session_store.clone();
        let app = test::init_service(App::new().app_data(web::Data::new(state)).configure(configure)).await;

        let req = test::TestRequest::post()
            .uri(&format!("/api/v1/sessions/{}/generate", id))
            .set_json(serde_json::json!({ "type": "adjust", "prompt": "warmer light" }))
            .to_request();
        let resp = test::call_service(&app, req).await;
        assert_eq!(resp.status(), StatusCode::ACCEPTED);

        let session = store.get(&id).await.unwrap();
        for _ in 0..100 {
            if !session.lock().await.loading() {
                break;
            }
            tokio::time::sleep(std::time::Duration::from_millis(5)).await;
        }
        let guard = session.lock().await;
        assert!(guard.variations().is_selecting());
        assert_eq!(guard.view().variations.unwrap().candidate_urls.len(), 4);
    }

    #[actix_web::test]
    async fn blobs_download_and_undo() {
        let state = app_state();
        let id = seeded(&state).await;
        let session = state.session_store.get(&id).await.unwrap();
        session
            .lock()
            .await
            .commit(
                CommitTarget::History,
                ImageResource::new("cat.png", "image/png", png_bytes(4, 4)),
            )
            .unwrap();
        let display = session.lock().await.display_url().unwrap().url.clone();
        let app = test::init_service(App::new().app_data(web::Data::new(state)).configure(configure)).await;

        let resp = test::call_service(&app, test::TestRequest::get().uri(&display).to_request()).await;
        assert_eq!(resp.status(), StatusCode::OK);
        assert_eq!(resp.headers().get("content-type").unwrap(), "image/png");

        let req = test::TestRequest::get()
            .uri(&format!("/api/v1/sessions/{}/download", id))
            .to_request();
        let resp = test::call_service(&app, req).await;
        let disposition = resp.headers().get("content-disposition").unwrap().to_str().unwrap();
        assert!(disposition.contains("edited-cat.png"));

        let req = test::TestRequest::post()
            .uri(&format!("/api/v1/sessions/{}/undo", id))
            .to_request();
        let body: serde_json::Value = test::call_and_read_body_json(&app, req).await;
        assert_eq!(body["history"]["cursor"], 0);
        assert_eq!(body["history"]["can_redo"], true);

        // The handle for the undone image is gone.
        let resp = test::call_service(&app, test::TestRequest::get().uri(&display).to_request()).await;
        assert_eq!(resp.status(), StatusCode::NOT_FOUND);
    }

    #[actix_web::test]
    async fn extend_is_accepted_and_finishes_in_background() {
        let state = app_state();
        let id = seeded(&state).await;
        let session = state.session_store.get(&id).await.unwrap();
        state
            .workflow
            .generate_video(&session, "slow pan".to_string())
            .await
            .unwrap();
        let app = test::init_service(App::new().app_data(web::Data::new(state)).configure(configure)).await;

        let req = test::TestRequest::post()
            .uri(&format!("/api/v1/sessions/{}/video/extend", id))
            .to_request();
        let resp = test::call_service(&app, req).await;
        assert_eq!(resp.status(), StatusCode::ACCEPTED);

        for _ in 0..100 {
            if !session.lock().await.loading() {
                break;
            }
            tokio::time::sleep(std::time::Duration::from_millis(5)).await;
        }
        assert_eq!(session.lock().await.video().state().name(), "extending");

        let req = test::TestRequest::post()
            .uri(&format!("/api/v1/sessions/{}/video/extend", id))
            .to_request();
        let resp = test::call_service(&app, req).await;
        assert_eq!(resp.status(), StatusCode::BAD_REQUEST);
    }
}
