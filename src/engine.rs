// ============================================================================
// EXECUTION ENGINE: transform / adjust / submit / reset / undo / redo
// ============================================================================
//
// The engine owns the committed history and at most one adjustment session.
// A session holds a live preview that is always recomputed from the image
// committed before the session started, never from a previous preview.
// Listeners are told about every change to the displayed image.

use std::path::Path;
use std::sync::Arc;

use uuid::Uuid;

use crate::buffer::PixelBuffer;
use crate::components::history::{HistoryEntry, HistoryManager};
use crate::error::{EngineError, Result};
use crate::io;
use crate::ops::adjustments::AdjustParam;
use crate::ops::blend::BlendMode;
use crate::ops::scheduler::Scheduler;
use crate::ops::steganography::{Payload, StegoParams};
use crate::ops::style::StyleTransfer;
use crate::ops::{ExecContext, Operation};
use crate::settings::EngineSettings;

pub type Listener = Box<dyn Fn(&PixelBuffer) + Send + Sync>;

/// A pending continuous adjustment and its preview.
pub struct AdjustmentSession {
    id: Uuid,
    base: Arc<PixelBuffer>,
    operation: Operation,
    preview: PixelBuffer,
}

impl AdjustmentSession {
    pub fn id(&self) -> Uuid {
        self.id
    }

    pub fn operation(&self) -> &Operation {
        &self.operation
    }

    pub fn param(&self) -> Option<AdjustParam> {
        match self.operation {
            Operation::Adjust { param, .. } => Some(param),
            _ => None,
        }
    }
}

pub struct Engine {
    id: Uuid,
    settings: EngineSettings,
    scheduler: Scheduler,
    history: HistoryManager,
    session: Option<AdjustmentSession>,
    blend_image: Option<Arc<PixelBuffer>>,
    style: Option<Box<dyn StyleTransfer>>,
    listeners: Vec<Listener>,
}

impl Engine {
    pub fn new(image: PixelBuffer, settings: EngineSettings) -> Self {
        let history = HistoryManager::new(image, settings.max_undo_steps, settings.max_history_bytes());
        let id = Uuid::new_v4();
        tracing::info!(engine = %id, width = history.current_image().width(), height = history.current_image().height(), "engine opened");
        Self {
            id,
            scheduler: settings.scheduler(),
            settings,
            history,
            session: None,
            blend_image: None,
            style: None,
            listeners: Vec::new(),
        }
    }

    /// Load `path` through the file layer and open it.
    pub fn open(path: &Path, settings: EngineSettings) -> Result<Self> {
        Ok(Self::new(io::load_image(path)?, settings))
    }

    pub fn with_style_transfer(mut self, model: Box<dyn StyleTransfer>) -> Self {
        self.style = Some(model);
        self
    }

    pub fn with_scheduler(mut self, scheduler: Scheduler) -> Self {
        self.scheduler = scheduler;
        self
    }

    pub fn id(&self) -> Uuid {
        self.id
    }

    pub fn settings(&self) -> &EngineSettings {
        &self.settings
    }

    pub fn scheduler(&self) -> &Scheduler {
        &self.scheduler
    }

    /// The displayed image: the preview while adjusting, else the latest commit.
    pub fn image(&self) -> &PixelBuffer {
        match &self.session {
            Some(session) => &session.preview,
            None => self.history.current_image().as_ref(),
        }
    }

    /// The latest committed image, ignoring any preview.
    pub fn committed_image(&self) -> &Arc<PixelBuffer> {
        self.history.current_image()
    }

    pub fn session(&self) -> Option<&AdjustmentSession> {
        self.session.as_ref()
    }

    pub fn is_adjusting(&self) -> bool {
        self.session.is_some()
    }

    pub fn add_listener<F>(&mut self, listener: F)
    where
        F: Fn(&PixelBuffer) + Send + Sync + 'static,
    {
        self.listeners.push(Box::new(listener));
    }

    fn notify(&self) {
        let image = self.image();
        for listener in &self.listeners {
            listener(image);
        }
    }

    fn context(&self) -> ExecContext<'_> {
        ExecContext::new(self.scheduler).with_style(self.style.as_deref())
    }

    fn discard_session(&mut self, reason: &str) {
        if let Some(session) = self.session.take() {
            tracing::warn!(session = %session.id, operation = %session.operation, reason, "adjustment preview discarded");
        }
    }

    // ------------------------------------------------------------------
    //  Transform
    // ------------------------------------------------------------------

    /// Apply `op` to the committed image and commit the result. A pending
    /// adjustment preview is dropped only once the operation has succeeded.
    pub fn transform(&mut self, op: Operation) -> Result<&PixelBuffer> {
        let src = Arc::clone(self.history.current_image());
        let result = op.apply(&src, &self.context());
        let image = result.inspect_err(|e| tracing::warn!(operation = %op, error = %e, "transform failed"))?;

        self.discard_session("transform requested");
        tracing::info!(engine = %self.id, operation = %op, "committed");
        self.history.push(HistoryEntry::committed(op, image));
        self.notify();
        Ok(self.image())
    }

    // ------------------------------------------------------------------
    //  Adjustment session
    // ------------------------------------------------------------------

    /// Preview `param_name` at `value`, computed from the pre-adjustment base.
    pub fn adjust(&mut self, param_name: &str, value: f64) -> Result<&PixelBuffer> {
        let param: AdjustParam = param_name
            .parse()
            .inspect_err(|e: &EngineError| tracing::warn!(error = %e, "adjust rejected"))?;
        let op = Operation::Adjust { param, value };

        let base = match &self.session {
            Some(session) => Arc::clone(&session.base),
            None => Arc::clone(self.history.current_image()),
        };
        let preview = op
            .apply(&base, &self.context())
            .inspect_err(|e| tracing::warn!(operation = %op, error = %e, "adjust failed"))?;

        let id = match &self.session {
            Some(session) if session.param() == Some(param) => session.id,
            Some(session) => {
                tracing::debug!(from = ?session.param(), to = %param, "adjustment parameter switched");
                Uuid::new_v4()
            }
            None => Uuid::new_v4(),
        };
        tracing::trace!(session = %id, operation = %op, "preview updated");
        self.session = Some(AdjustmentSession { id, base, operation: op, preview });
        self.notify();
        Ok(self.image())
    }

    /// Commit the current preview.
    pub fn submit_adjustment(&mut self) -> Result<&PixelBuffer> {
        let session = self.session.take().ok_or(EngineError::NoActiveAdjustment)?;
        tracing::info!(engine = %self.id, session = %session.id, operation = %session.operation, "adjustment submitted");
        self.history.push(HistoryEntry::committed(session.operation, session.preview));
        self.notify();
        Ok(self.image())
    }

    /// Drop the preview; the displayed image reverts to the base.
    pub fn reset_adjustment(&mut self) -> Result<&PixelBuffer> {
        let session = self.session.take().ok_or(EngineError::NoActiveAdjustment)?;
        tracing::debug!(session = %session.id, "adjustment reset");
        self.notify();
        Ok(self.image())
    }

    // ------------------------------------------------------------------
    //  History
    // ------------------------------------------------------------------

    pub fn undo(&mut self) -> Result<&PixelBuffer> {
        if !self.history.can_undo() {
            return Err(EngineError::NothingToUndo);
        }
        self.discard_session("undo requested");
        let description = self.history.undo()?.description().to_string();
        tracing::info!(engine = %self.id, now_at = %description, "undo");
        self.notify();
        Ok(self.image())
    }

    pub fn redo(&mut self) -> Result<&PixelBuffer> {
        if !self.history.can_redo() {
            return Err(EngineError::NothingToRedo);
        }
        self.discard_session("redo requested");
        let description = self.history.redo()?.description().to_string();
        tracing::info!(engine = %self.id, now_at = %description, "redo");
        self.notify();
        Ok(self.image())
    }

    pub fn can_undo(&self) -> bool {
        self.history.can_undo()
    }

    pub fn can_redo(&self) -> bool {
        self.history.can_redo()
    }

    pub fn history_descriptions(&self) -> Vec<String> {
        self.history.descriptions()
    }

    pub fn operation_log(&self) -> Vec<Operation> {
        self.history.operation_log()
    }

    pub fn history(&self) -> &HistoryManager {
        &self.history
    }

    // ------------------------------------------------------------------
    //  Convenience entry points
    // ------------------------------------------------------------------

    /// Register the image used by [`Engine::blend`]. Must match the working
    /// image size.
    pub fn set_blend_image(&mut self, image: PixelBuffer) -> Result<()> {
        let current = self.history.current_image();
        if !current.same_dimensions(&image) {
            return Err(EngineError::mismatch(current.dimensions(), image.dimensions()));
        }
        self.blend_image = Some(Arc::new(image));
        Ok(())
    }

    pub fn blend(&mut self, mode: BlendMode) -> Result<&PixelBuffer> {
        let image = self
            .blend_image
            .clone()
            .ok_or_else(|| EngineError::invalid("no blend image registered"))?;
        self.transform(Operation::Blend { mode, image })
    }

    /// Canny edge detection using the configured blur radius.
    pub fn edge_detection(&mut self) -> Result<&PixelBuffer> {
        let blur_radius = self.settings.edge_blur_radius;
        self.transform(Operation::EdgeDetection { blur_radius })
    }

    /// Stego parameters using the configured bit depth.
    pub fn stego_params(&self, key: Option<&str>) -> StegoParams {
        StegoParams {
            key: key.map(str::to_string),
            bits: self.settings.stego_bits,
            ..StegoParams::default()
        }
    }

    pub fn encode_text(&mut self, text: &str, key: Option<&str>, only_r_channel: bool) -> Result<&PixelBuffer> {
        let params = StegoParams { only_r_channel, ..self.stego_params(key) };
        self.transform(Operation::SteganographyEncode { payload: Payload::Text(text.to_string()), params })
    }

    pub fn encode_image(&mut self, image: PixelBuffer, key: Option<&str>, by_pixel_order: bool) -> Result<&PixelBuffer> {
        let params = StegoParams { by_pixel_order, ..self.stego_params(key) };
        self.transform(Operation::SteganographyEncode { payload: Payload::Image(image), params })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Mutex;

    fn engine() -> Engine {
        let img = PixelBuffer::from_fn(6, 5, |x, y| [x as f32 / 6.0, y as f32 / 5.0, 0.4, 1.0]).unwrap();
        Engine::new(img, EngineSettings::default()).with_scheduler(Scheduler::new(2, std::time::Duration::from_secs(60)))
    }

    #[test]
    fn test_reset_restores_base_exactly() {
        let mut e = engine();
        let before = e.image().clone();
        e.adjust("brightness", 0.3).unwrap();
        assert_ne!(*e.image(), before);
        assert_eq!(*e.reset_adjustment().unwrap(), before);
        assert!(!e.is_adjusting());
    }

    #[test]
    fn test_previews_do_not_compose() {
        let mut e = engine();
        e.adjust("brightness", 0.1).unwrap();
        e.adjust("brightness", 0.1).unwrap();
        let twice = e.image().clone();
        e.reset_adjustment().unwrap();
        e.adjust("brightness", 0.1).unwrap();
        assert_eq!(*e.image(), twice);
    }

    #[test]
    fn test_submit_then_undo_returns_to_base() {
        let mut e = engine();
        let before = e.image().clone();
        e.adjust("contrast", 0.5).unwrap();
        e.submit_adjustment().unwrap();
        assert_eq!(e.history_descriptions().len(), 2);
        assert_eq!(*e.undo().unwrap(), before);
    }

    #[test]
    fn test_no_session_errors() {
        let mut e = engine();
        assert!(matches!(e.submit_adjustment(), Err(EngineError::NoActiveAdjustment)));
        assert!(matches!(e.reset_adjustment(), Err(EngineError::NoActiveAdjustment)));
        assert!(matches!(e.undo(), Err(EngineError::NothingToUndo)));
        assert!(matches!(e.redo(), Err(EngineError::NothingToRedo)));
    }

    #[test]
    fn test_unknown_adjustment_leaves_state_alone() {
        let mut e = engine();
        e.adjust("red", 0.5).unwrap();
        let preview = e.image().clone();
        assert!(matches!(e.adjust("gamma", 1.0), Err(EngineError::UnknownAdjustment(_))));
        assert_eq!(*e.image(), preview);
    }

    #[test]
    fn test_transform_discards_preview() {
        let mut e = engine();
        let base = e.image().clone();
        e.adjust("brightness", 0.5).unwrap();
        e.transform(Operation::FlipHorizontal).unwrap();
        assert!(!e.is_adjusting());
        e.undo().unwrap();
        assert_eq!(*e.image(), base);
    }

    #[test]
    fn test_failed_transform_does_not_commit() {
        let mut e = engine();
        let other = PixelBuffer::new(2, 2).unwrap();
        let r = e.transform(Operation::Blend { mode: BlendMode::Multiply, image: Arc::new(other) });
        assert!(matches!(r, Err(EngineError::DimensionMismatch { .. })));
        assert!(!e.can_undo());
    }

    #[test]
    fn test_listeners_see_every_change() {
        let seen = Arc::new(Mutex::new(0usize));
        let mut e = engine();
        let counter = Arc::clone(&seen);
        e.add_listener(move |_| *counter.lock().unwrap() += 1);
        e.transform(Operation::Grayscale).unwrap();
        e.adjust("hue", 30.0).unwrap();
        e.reset_adjustment().unwrap();
        e.undo().unwrap();
        e.redo().unwrap();
        assert_eq!(*seen.lock().unwrap(), 5);
    }

    #[test]
    fn test_failed_transform_keeps_adjustment_session() {
        let last_seen: Arc<Mutex<Option<PixelBuffer>>> = Arc::new(Mutex::new(None));
        let mut e = engine();
        let sink = Arc::clone(&last_seen);
        e.add_listener(move |img| *sink.lock().unwrap() = Some(img.clone()));

        e.adjust("brightness", 0.3).unwrap();
        let preview = e.image().clone();
        let tiny = Arc::new(PixelBuffer::new(1, 1).unwrap());
        assert!(e.transform(Operation::Blend { mode: BlendMode::Multiply, image: tiny }).is_err());

        assert!(e.is_adjusting());
        assert_eq!(e.image(), &preview);
        assert_eq!(last_seen.lock().unwrap().as_ref(), Some(e.image()));
        assert!(!e.can_undo());
    }

    #[test]
    fn test_switching_parameter_replaces_session() {
        let mut e = engine();
        e.adjust("red", 0.5).unwrap();
        let first = e.session().unwrap().id();
        e.adjust("red", 0.7).unwrap();
        assert_eq!(e.session().unwrap().id(), first);
        e.adjust("blue", 0.2).unwrap();
        assert_ne!(e.session().unwrap().id(), first);
        assert_eq!(e.session().unwrap().param(), Some(AdjustParam::Blue));
    }

    #[test]
    fn test_operation_log_follows_undo() {
        let mut e = engine();
        e.transform(Operation::Grayscale).unwrap();
        e.transform(Operation::Sharpen).unwrap();
        e.undo().unwrap();
        assert_eq!(e.operation_log(), vec![Operation::Grayscale]);
    }

    #[test]
    fn test_blend_needs_registered_image() {
        let mut e = engine();
        assert!(matches!(e.blend(BlendMode::Screen), Err(EngineError::InvalidOperation(_))));
        assert!(e.set_blend_image(PixelBuffer::new(1, 1).unwrap()).is_err());
        e.set_blend_image(PixelBuffer::filled(6, 5, [1.0; 4]).unwrap()).unwrap();
        let out = e.blend(BlendMode::Multiply).unwrap().clone();
        assert_eq!(out, **e.committed_image());
    }
}
