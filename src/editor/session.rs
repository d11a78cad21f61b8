// src/editor/session.rs
use crate::editor::batch::BatchStore;
use crate::editor::history::HistoryStore;
use crate::editor::object_urls::{DisplaySlot, ObjectUrl, ObjectUrlCache};
use crate::editor::variations::VariationGate;
use crate::editor::video_flow::VideoFlow;
use crate::errors::PixshopError;
use crate::models::*;
use bytes::Bytes;
use chrono::{DateTime, Utc};
use log::info;
use uuid::Uuid;

#[derive(Debug)]
pub enum Workspace {
    Empty,
    Single(HistoryStore<ImageResource>),
    Batch(BatchStore<ImageResource>),
}

/// Where a generated result lands once chosen.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CommitTarget {
    History,
    /// Carries the pair's original id so a reloaded batch is never written into.
    BatchPair { index: usize, original: Uuid },
}

/// All editor state for one browser session, mutated only through these methods.
#[derive(Debug)]
pub struct EditorSession {
    id: Uuid,
    created_at: DateTime<Utc>,
    workspace: Workspace,
    tool: Tool,
    hotspot: Option<Hotspot>,
    crop_selection: Option<CropRect>,
    loading: bool,
    progress: Option<String>,
    last_error: Option<String>,
    reference_image: Option<ImageResource>,
    character_images: Vec<ImageResource>,
    gate: VariationGate<ImageResource, CommitTarget>,
    candidate_urls: Vec<ObjectUrl>,
    pub(crate) video: VideoFlow,
    pub(crate) urls: ObjectUrlCache,
    display: DisplaySlot,
}

impl EditorSession {
    pub fn new(id: Uuid) -> Self {
        Self {
            id,
            created_at: Utc::now(),
            workspace: Workspace::Empty,
            tool: Tool::Retouch,
            hotspot: None,
            crop_selection: None,
            loading: false,
            progress: None,
            last_error: None,
            reference_image: None,
            character_images: Vec::new(),
            gate: VariationGate::default(),
            candidate_urls: Vec::new(),
            video: VideoFlow::default(),
            urls: ObjectUrlCache::new(id),
            display: DisplaySlot::default(),
        }
    }

    pub fn id(&self) -> Uuid {
        self.id
    }

    /// One image starts single mode; several start batch mode.
    pub fn load(&mut self, mut images: Vec<ImageResource>) -> Result<(), PixshopError> {
        self.workspace = match images.len() {
            0 => return Err(PixshopError::validation("Please upload at least one image.")),
            1 => Workspace::Single(HistoryStore::with_original(images.remove(0))),
            _ => Workspace::Batch(BatchStore::load(images)),
        };
        self.discard_variations();
        self.video.reset(&mut self.urls);
        self.last_error = None;
        self.clear_transient();
        self.refresh_display();
        info!("session {}: loaded {:?} workspace", self.id, self.mode());
        Ok(())
    }

    pub fn mode(&self) -> WorkspaceMode {
        match self.workspace {
            Workspace::Empty => WorkspaceMode::Empty,
            Workspace::Single(_) => WorkspaceMode::Single,
            Workspace::Batch(_) => WorkspaceMode::Batch,
        }
    }

    pub fn workspace(&self) -> &Workspace {
        &self.workspace
    }

    pub fn current_image(&self) -> Option<&ImageResource> {
        match &self.workspace {
            Workspace::Empty => None,
            Workspace::Single(history) => history.current(),
            Workspace::Batch(batch) => batch.active_pair().map(|pair| &pair.edited),
        }
    }

    pub fn original_image(&self) -> Option<&ImageResource> {
        match &self.workspace {
            Workspace::Empty => None,
            Workspace::Single(history) => history.original(),
            Workspace::Batch(batch) => batch.active_pair().map(|pair| pair.original()),
        }
    }

    /// The target a result generated right now should be written into.
    pub fn commit_target(&self) -> Result<CommitTarget, PixshopError> {
        match &self.workspace {
            Workspace::Empty => Err(PixshopError::validation("Please upload an image first.")),
            Workspace::Single(_) => Ok(CommitTarget::History),
            Workspace::Batch(batch) => batch
                .active_pair()
                .map(|pair| CommitTarget::BatchPair {
                    index: batch.active_index(),
                    original: pair.original().id,
                })
                .ok_or_else(|| PixshopError::validation("Please upload an image first.")),
        }
    }

    pub fn commit(&mut self, target: CommitTarget, image: ImageResource) -> Result<(), PixshopError> {
        match (&mut self.workspace, target) {
            (Workspace::Single(history), CommitTarget::History) => history.commit(image),
            (Workspace::Batch(batch), CommitTarget::BatchPair { index, original }) => {
                let matches = batch
                    .pair(index)
                    .is_some_and(|pair| pair.original().id == original);
                if !matches {
                    return Err(PixshopError::validation(
                        "The image this result was generated for is no longer loaded.",
                    ));
                }
                if index == batch.active_index() {
                    batch.commit_edit(image);
                } else {
                    batch.set_edited(index, image);
                }
            }
            _ => {
                return Err(PixshopError::validation(
                    "The editing mode changed before the result arrived.",
                ));
            }
        }
        self.clear_transient();
        self.refresh_display();
        Ok(())
    }

    pub fn tool(&self) -> Tool {
        self.tool
    }

    pub fn select_tool(&mut self, tool: Tool) {
        if self.tool != tool {
            self.tool = tool;
            self.clear_transient();
        }
    }

    pub fn hotspot(&self) -> Option<Hotspot> {
        self.hotspot
    }

    pub fn set_hotspot(&mut self, hotspot: Hotspot) -> Result<(), PixshopError> {
        if self.tool != Tool::Retouch {
            return Err(PixshopError::validation(
                "Select the retouch tool to pick an edit location.",
            ));
        }
        if self.current_image().is_none() {
            return Err(PixshopError::validation("Please upload an image first."));
        }
        self.hotspot = Some(hotspot);
        Ok(())
    }

    pub fn crop_selection(&self) -> Option<CropRect> {
        self.crop_selection
    }

    pub fn set_crop_selection(&mut self, rect: CropRect) -> Result<(), PixshopError> {
        if self.tool != Tool::Crop {
            return Err(PixshopError::validation("Select the crop tool to choose a crop area."));
        }
        if self.current_image().is_none() {
            return Err(PixshopError::validation("Please upload an image first."));
        }
        self.crop_selection = Some(rect);
        Ok(())
    }

    pub fn undo(&mut self) -> Result<bool, PixshopError> {
        let moved = self.history_mut()?.undo();
        self.after_navigation(moved);
        Ok(moved)
    }

    pub fn redo(&mut self) -> Result<bool, PixshopError> {
        let moved = self.history_mut()?.redo();
        self.after_navigation(moved);
        Ok(moved)
    }

    pub fn reset_to_original(&mut self) -> Result<(), PixshopError> {
        let history = self.history_mut()?;
        let moved = history.cursor() != 0;
        history.reset_to_original();
        self.after_navigation(moved);
        Ok(())
    }

    pub fn set_active(&mut self, index: usize) -> Result<bool, PixshopError> {
        let batch = match &mut self.workspace {
            Workspace::Batch(batch) => batch,
            _ => return Err(PixshopError::validation("Not in batch mode.")),
        };
        let changed = index != batch.active_index() && batch.set_active(index);
        self.after_navigation(changed);
        Ok(changed)
    }

    pub fn loading(&self) -> bool {
        self.loading
    }

    pub fn progress(&self) -> Option<&str> {
        self.progress.as_deref()
    }

    pub fn last_error(&self) -> Option<&str> {
        self.last_error.as_deref()
    }

    pub fn begin_loading(&mut self, message: impl Into<String>) {
        self.loading = true;
        self.progress = Some(message.into());
        self.last_error = None;
    }

    pub fn set_progress(&mut self, message: impl Into<String>) {
        self.progress = Some(message.into());
    }

    pub fn finish_loading(&mut self) {
        self.loading = false;
        self.progress = None;
    }

    /// Stops loading and records the message shown in the error panel.
    pub fn fail(&mut self, err: &PixshopError) {
        self.finish_loading();
        self.last_error = Some(err.to_string());
    }

    pub fn dismiss_error(&mut self) {
        self.last_error = None;
    }

    pub fn reference_image(&self) -> Option<&ImageResource> {
        self.reference_image.as_ref()
    }

    pub fn set_reference_image(&mut self, image: ImageResource) {
        self.reference_image = Some(image);
    }

    pub fn character_images(&self) -> &[ImageResource] {
        &self.character_images
    }

    pub fn add_character_images(&mut self, images: Vec<ImageResource>) {
        self.character_images.extend(images);
    }

    pub fn clear_character_images(&mut self) {
        self.character_images.clear();
    }

    pub fn open_variations(
        &mut self,
        candidates: Vec<ImageResource>,
        target: CommitTarget,
    ) -> Result<(), PixshopError> {
        let ids: Vec<Uuid> = candidates.iter().map(|c| c.id).collect();
        self.gate.open(candidates, target)?;
        self.release_candidate_urls();
        self.candidate_urls = ids.into_iter().map(|id| self.urls.create(id)).collect();
        self.finish_loading();
        Ok(())
    }

    pub fn variations(&self) -> &VariationGate<ImageResource, CommitTarget> {
        &self.gate
    }

    pub fn preview_variation(&mut self, index: usize) -> Result<(), PixshopError> {
        self.gate.preview(index)
    }

    pub fn confirm_variation(&mut self, index: usize) -> Result<(), PixshopError> {
        let selection = self.gate.confirm(index)?;
        self.release_candidate_urls();
        let committed = self.commit(selection.action, selection.chosen);
        self.clear_transient();
        committed
    }

    pub fn cancel_variations(&mut self) -> bool {
        let had_open = self.discard_variations();
        self.clear_transient();
        had_open
    }

    pub fn video(&self) -> &VideoFlow {
        &self.video
    }

    pub fn display_url(&self) -> Option<&ObjectUrl> {
        self.display.url()
    }

    /// Looks up the bytes behind a live display token.
    pub fn resolve_blob(&self, token: &Uuid) -> Option<(String, Bytes)> {
        let resource_id = self.urls.resolve(token)?;
        let mut images = self
            .current_image()
            .into_iter()
            .chain(self.gate.current().into_iter().flat_map(|set| set.candidates()))
            .chain(self.video.frame());
        if let Some(image) = images.find(|image| image.id == resource_id) {
            return Some((image.mime_type.clone(), image.data.clone()));
        }
        self.video
            .video()
            .filter(|video| video.id == resource_id)
            .map(|video| (video.mime_type.clone(), video.data.clone()))
    }

    /// Releases every display handle; called when the session is dropped.
    pub fn close(&mut self) {
        self.discard_variations();
        self.video.reset(&mut self.urls);
        self.display.clear(&mut self.urls);
        self.urls.release_all();
    }

    pub fn view(&self) -> SessionView {
        let history = match &self.workspace {
            Workspace::Single(history) => Some(HistoryView {
                cursor: history.cursor(),
                length: history.len(),
                can_undo: history.can_undo(),
                can_redo: history.can_redo(),
            }),
            _ => None,
        };
        let batch = match &self.workspace {
            Workspace::Batch(batch) => Some(BatchView {
                active_index: batch.active_index(),
                pairs: batch
                    .pairs()
                    .iter()
                    .map(|pair| BatchPairView {
                        name: pair.original().name.clone(),
                        edited: pair.edited.id != pair.original().id,
                    })
                    .collect(),
            }),
            _ => None,
        };
        let variations = self.gate.current().map(|set| VariationView {
            candidate_urls: self.candidate_urls.iter().map(|u| u.url.clone()).collect(),
            previewed: set.previewed(),
        });

        SessionView {
            id: self.id,
            mode: self.mode(),
            tool: self.tool,
            loading: self.loading,
            progress_message: self.progress.clone(),
            error: self.last_error.clone(),
            display_url: self.display.url().map(|u| u.url.clone()),
            history,
            batch,
            hotspot: self.hotspot,
            crop_selection: self.crop_selection,
            variations,
            video: VideoView {
                state: self.video.state().name(),
                video_url: self.video.video_url().map(|u| u.url.clone()),
                frame_url: self.video.frame_url().map(|u| u.url.clone()),
            },
            reference_name: self.reference_image.as_ref().map(|i| i.name.clone()),
            character_count: self.character_images.len(),
            created_at: self.created_at,
        }
    }

    fn history_mut(&mut self) -> Result<&mut HistoryStore<ImageResource>, PixshopError> {
        match &mut self.workspace {
            Workspace::Single(history) => Ok(history),
            _ => Err(PixshopError::validation(
                "Undo and redo are only available when editing a single image.",
            )),
        }
    }

    fn after_navigation(&mut self, moved: bool) {
        if moved {
            self.clear_transient();
            self.refresh_display();
        }
    }

    fn clear_transient(&mut self) {
        self.hotspot = None;
        self.crop_selection = None;
    }

    fn discard_variations(&mut self) -> bool {
        let had_open = self.gate.cancel().is_some();
        self.release_candidate_urls();
        had_open
    }

    fn release_candidate_urls(&mut self) {
        for url in self.candidate_urls.drain(..) {
            self.urls.release(&url);
        }
    }

    fn refresh_display(&mut self) {
        match self.current_image().map(|image| image.id) {
            Some(id) => {
                self.display.show(&mut self.urls, id);
            }
            None => self.display.clear(&mut self.urls),
        }
    }
}
