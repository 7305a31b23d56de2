use std::collections::VecDeque;
use std::sync::Arc;

use crate::buffer::PixelBuffer;
use crate::error::{EngineError, Result};
use crate::ops::Operation;

// ============================================================================
// HISTORY ENTRY: one committed image and the operation that produced it
// ============================================================================

#[derive(Clone, Debug)]
pub struct HistoryEntry {
    description: String,
    /// `None` for the opened image.
    operation: Option<Operation>,
    image: Arc<PixelBuffer>,
}

impl HistoryEntry {
    pub fn initial(image: PixelBuffer) -> Self {
        Self { description: "Open".to_string(), operation: None, image: Arc::new(image) }
    }

    pub fn committed(operation: Operation, image: PixelBuffer) -> Self {
        Self { description: operation.to_string(), operation: Some(operation), image: Arc::new(image) }
    }

    pub fn description(&self) -> &str {
        &self.description
    }

    pub fn operation(&self) -> Option<&Operation> {
        self.operation.as_ref()
    }

    pub fn image(&self) -> &Arc<PixelBuffer> {
        &self.image
    }

    fn memory_size(&self) -> usize {
        self.image.memory_bytes() + self.description.len()
    }
}

// ============================================================================
// HISTORY MANAGER - Manages undo/redo stacks with memory limits
// ============================================================================

/// Snapshot history. `base` is the oldest state still reachable; every
/// committed state after it lives on `undo_stack`, newest at the back.
pub struct HistoryManager {
    base: HistoryEntry,
    undo_stack: VecDeque<HistoryEntry>,
    redo_stack: VecDeque<HistoryEntry>,
    max_history_size: usize,
    /// Optional memory cap in bytes.
    max_memory_bytes: Option<usize>,
    /// Running memory total across base and both stacks.
    total_memory: usize,
    /// Operations of states that were pruned past the base; they can no
    /// longer be undone but still belong to the log.
    pruned_log: Vec<Operation>,
}

impl HistoryManager {
    pub fn new(initial: PixelBuffer, max_history_size: usize, max_memory_bytes: Option<usize>) -> Self {
        let base = HistoryEntry::initial(initial);
        let total_memory = base.memory_size();
        Self {
            base,
            undo_stack: VecDeque::new(),
            redo_stack: VecDeque::new(),
            max_history_size: max_history_size.max(1),
            max_memory_bytes,
            total_memory,
            pruned_log: Vec::new(),
        }
    }

    /// The latest committed entry.
    pub fn current(&self) -> &HistoryEntry {
        self.undo_stack.back().unwrap_or(&self.base)
    }

    pub fn current_image(&self) -> &Arc<PixelBuffer> {
        self.current().image()
    }

    pub fn push(&mut self, entry: HistoryEntry) {
        // Clear redo stack when a new action is performed
        for e in self.redo_stack.drain(..) {
            self.total_memory = self.total_memory.saturating_sub(e.memory_size());
        }

        self.total_memory += entry.memory_size();
        self.undo_stack.push_back(entry);

        self.prune();
    }

    pub fn undo(&mut self) -> Result<&HistoryEntry> {
        let entry = self.undo_stack.pop_back().ok_or(EngineError::NothingToUndo)?;
        self.redo_stack.push_back(entry);
        Ok(self.current())
    }

    pub fn redo(&mut self) -> Result<&HistoryEntry> {
        let entry = self.redo_stack.pop_back().ok_or(EngineError::NothingToRedo)?;
        self.undo_stack.push_back(entry);
        Ok(self.current())
    }

    pub fn can_undo(&self) -> bool {
        !self.undo_stack.is_empty()
    }

    pub fn can_redo(&self) -> bool {
        !self.redo_stack.is_empty()
    }

    pub fn undo_description(&self) -> Option<&str> {
        self.undo_stack.back().map(|e| e.description())
    }

    pub fn redo_description(&self) -> Option<&str> {
        self.redo_stack.back().map(|e| e.description())
    }

    /// Descriptions of every reachable state, oldest first (base included).
    pub fn descriptions(&self) -> Vec<String> {
        std::iter::once(&self.base)
            .chain(self.undo_stack.iter())
            .map(|e| e.description().to_string())
            .collect()
    }

    /// Every committed operation that led to the current state, in order.
    pub fn operation_log(&self) -> Vec<Operation> {
        self.pruned_log
            .iter()
            .cloned()
            .chain(std::iter::once(&self.base).chain(self.undo_stack.iter()).filter_map(|e| e.operation().cloned()))
            .collect()
    }

    /// Get the current memory usage of the history (O(1) via cached total)
    pub fn memory_usage(&self) -> usize {
        self.total_memory
    }

    pub fn undo_count(&self) -> usize {
        self.undo_stack.len()
    }

    pub fn redo_count(&self) -> usize {
        self.redo_stack.len()
    }

    /// Drop the oldest states until both limits hold. The oldest surviving
    /// entry becomes the new base; the current state is never dropped.
    fn prune(&mut self) {
        while self.undo_stack.len() > self.max_history_size {
            self.advance_base();
        }

        if let Some(max_bytes) = self.max_memory_bytes {
            while self.total_memory > max_bytes && !self.undo_stack.is_empty() {
                self.advance_base();
            }
        }
    }

    fn advance_base(&mut self) {
        if let Some(next) = self.undo_stack.pop_front() {
            let old = std::mem::replace(&mut self.base, next);
            self.total_memory = self.total_memory.saturating_sub(old.memory_size());
            if let Some(op) = old.operation {
                self.pruned_log.push(op);
            }
            tracing::debug!(dropped = %old.description, "history pruned");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn img(v: f32) -> PixelBuffer {
        PixelBuffer::filled(2, 2, [v, v, v, 1.0]).unwrap()
    }

    #[test]
    fn test_undo_redo_walk() {
        let mut h = HistoryManager::new(img(0.0), 10, None);
        h.push(HistoryEntry::committed(Operation::Grayscale, img(0.1)));
        h.push(HistoryEntry::committed(Operation::Sharpen, img(0.2)));

        assert_eq!(h.undo().unwrap().description(), "Grayscale");
        assert_eq!(h.undo().unwrap().description(), "Open");
        assert!(matches!(h.undo(), Err(EngineError::NothingToUndo)));
        assert_eq!(h.redo().unwrap().description(), "Grayscale");
        assert_eq!(**h.current_image(), img(0.1));
    }

    #[test]
    fn test_push_clears_redo() {
        let mut h = HistoryManager::new(img(0.0), 10, None);
        h.push(HistoryEntry::committed(Operation::Grayscale, img(0.1)));
        h.undo().unwrap();
        assert!(h.can_redo());
        h.push(HistoryEntry::committed(Operation::Sharpen, img(0.3)));
        assert!(!h.can_redo());
        assert!(matches!(h.redo(), Err(EngineError::NothingToRedo)));
    }

    #[test]
    fn test_count_limit_moves_base_forward() {
        let mut h = HistoryManager::new(img(0.0), 2, None);
        for op in [Operation::Grayscale, Operation::Sharpen, Operation::FlipVertical] {
            h.push(HistoryEntry::committed(op, img(0.5)));
        }
        assert_eq!(h.undo_count(), 2);
        assert_eq!(h.descriptions(), vec!["Grayscale", "Sharpen", "Flip vertical"]);
        assert_eq!(
            h.operation_log(),
            vec![Operation::Grayscale, Operation::Sharpen, Operation::FlipVertical]
        );
    }

    #[test]
    fn test_memory_limit_keeps_current_state() {
        let one = img(0.0).memory_bytes() + 16;
        let mut h = HistoryManager::new(img(0.0), 50, Some(one));
        h.push(HistoryEntry::committed(Operation::Grayscale, img(0.1)));
        h.push(HistoryEntry::committed(Operation::Sharpen, img(0.2)));
        assert_eq!(h.undo_count(), 0);
        assert_eq!(h.current().description(), "Sharpen");
        assert_eq!(h.operation_log(), vec![Operation::Grayscale, Operation::Sharpen]);
    }
}
