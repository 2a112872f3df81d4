//! Diagnostic metadata captured when a node is recorded.
//!
//! Nodes remember the scope they were created in and the source location of the call that
//! created them. Neither takes part in hashing; both only feed diagnostic rendering.
//!
//! Scopes form a thread-local stack. Pushing returns an RAII guard that pops on drop:
//! ```rust,ignore
//! let _layer = push_scope("decoder");
//! let _block = push_scope("attn");
//! assert_eq!(current_scope(), "decoder/attn");
//! ```

use std::cell::RefCell;
use std::fmt;
use std::panic::Location;

thread_local! {
    static SCOPE_STACK: RefCell<Vec<String>> = const { RefCell::new(Vec::new()) };
}

/// RAII guard that restores the previous scope when dropped.
pub struct ScopeGuard {
    active: bool,
}

impl Drop for ScopeGuard {
    fn drop(&mut self) {
        if self.active {
            SCOPE_STACK.with(|stack| {
                stack.borrow_mut().pop();
            });
            self.active = false;
        }
    }
}

/// Pushes `name` onto the current thread's scope stack.
pub fn push_scope(name: impl Into<String>) -> ScopeGuard {
    SCOPE_STACK.with(|stack| stack.borrow_mut().push(name.into()));
    ScopeGuard { active: true }
}

/// Runs `f` with `name` pushed as the innermost scope.
pub fn with_scope<F, R>(name: impl Into<String>, f: F) -> R
where
    F: FnOnce() -> R,
{
    let guard = push_scope(name);
    let result = f();
    drop(guard);
    result
}

/// Slash-joined path of the active scopes, or an empty string outside any scope.
pub fn current_scope() -> String {
    SCOPE_STACK.with(|stack| stack.borrow().join("/"))
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SourceLocation {
    pub function: Option<String>,
    pub file: String,
    pub line: u32,
}

impl SourceLocation {
    pub fn new(function: Option<String>, file: impl Into<String>, line: u32) -> Self {
        SourceLocation {
            function,
            file: file.into(),
            line,
        }
    }
}

impl From<&Location<'_>> for SourceLocation {
    fn from(location: &Location<'_>) -> Self {
        SourceLocation::new(None, location.file(), location.line())
    }
}

impl fmt::Display for SourceLocation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if let Some(function) = &self.function {
            write!(f, "{function}@")?;
        }
        write!(f, "{}:{}", self.file, self.line)
    }
}

/// Call-site frames, innermost first.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct FrameInfo {
    frames: Vec<SourceLocation>,
}

impl FrameInfo {
    /// Captures the location of the outermost `#[track_caller]` call.
    #[track_caller]
    pub fn caller() -> Self {
        FrameInfo {
            frames: vec![SourceLocation::from(Location::caller())],
        }
    }

    pub fn innermost(&self) -> Option<&SourceLocation> {
        self.frames.first()
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct NodeMetadata {
    pub scope: String,
    pub frame_info: Option<FrameInfo>,
}

impl NodeMetadata {
    /// Records the current scope and the caller's source location.
    #[track_caller]
    pub fn capture() -> Self {
        NodeMetadata {
            scope: current_scope(),
            frame_info: Some(FrameInfo::caller()),
        }
    }

    /// Writes the condensed `, scope=...` and `, location=...` suffixes.
    pub fn write_summary(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if !self.scope.is_empty() {
            write!(f, ", scope={}", self.scope)?;
        }
        if let Some(location) = self.frame_info.as_ref().and_then(FrameInfo::innermost) {
            write!(f, ", location={location}")?;
        }
        Ok(())
    }
}
