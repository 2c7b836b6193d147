use kshadow_ir::{FuncRef, ValueId};

use crate::{domain::Domain, table::ShadowValueTable, Result, ShadowError};

/// The shadows of one function activation.
#[derive(Debug, Clone)]
pub struct Frame<D: Domain> {
    /// The result id of the call that created the frame. `None` for the
    /// kernel entry frame and for calls without a result.
    pub call_site: Option<ValueId>,
    pub callee: Option<FuncRef>,
    pub values: ShadowValueTable<D>,
}

impl<D: Domain> Frame<D> {
    fn new(call_site: Option<ValueId>, callee: Option<FuncRef>) -> Self {
        Self {
            call_site,
            callee,
            values: ShadowValueTable::new(),
        }
    }
}

/// Call frames of one work-item. The bottom frame belongs to the kernel
/// entry point.
#[derive(Debug, Clone)]
pub struct CallFrameStack<D: Domain> {
    frames: Vec<Frame<D>>,
}

impl<D: Domain> CallFrameStack<D> {
    pub fn new() -> Self {
        Self {
            frames: vec![Frame::new(None, None)],
        }
    }

    pub fn push(&mut self, call_site: Option<ValueId>, callee: Option<FuncRef>) -> &mut Frame<D> {
        self.frames.push(Frame::new(call_site, callee));
        let depth = self.frames.len();
        tracing::trace!(depth, ?call_site, "push call frame");
        // Just pushed.
        let last = depth - 1;
        &mut self.frames[last]
    }

    pub fn pop(&mut self) -> Result<Frame<D>> {
        let frame = self.frames.pop().ok_or(ShadowError::EmptyCallStack)?;
        tracing::trace!(depth = self.frames.len(), call_site = ?frame.call_site, "pop call frame");
        Ok(frame)
    }

    pub fn top(&self) -> Result<&Frame<D>> {
        self.frames.last().ok_or(ShadowError::EmptyCallStack)
    }

    pub fn top_mut(&mut self) -> Result<&mut Frame<D>> {
        self.frames.last_mut().ok_or(ShadowError::EmptyCallStack)
    }

    pub fn depth(&self) -> usize {
        self.frames.len()
    }
}

impl<D: Domain> Default for CallFrameStack<D> {
    fn default() -> Self {
        Self::new()
    }
}
