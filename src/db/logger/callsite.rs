//! Call-site resolution for SQL trace records.
//!
//! The resolver walks the current stack, skips a fixed number of frames plus the
//! caller-requested extra skip, and reports the first frame that belongs to
//! application code. Frames from this crate, from dependencies and from the
//! toolchain are passed over, as are generated sources. Test files always count as
//! application code.

/// One resolved stack frame.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Frame {
    pub file: String,
    pub line: u32,
}

impl Frame {
    pub fn new(file: impl Into<String>, line: u32) -> Self {
        Self {
            file: file.into(),
            line,
        }
    }
}

/// A source of stack frames, innermost first.
pub trait FrameSource: Send + Sync {
    /// Up to `max` frames after skipping the `skip` innermost ones.
    fn frames(&self, skip: usize, max: usize) -> Vec<Frame>;
}

/// Frames of the running thread, resolved with the `backtrace` crate.
#[derive(Debug, Default, Clone, Copy)]
pub struct BacktraceFrames;

impl FrameSource for BacktraceFrames {
    fn frames(&self, skip: usize, max: usize) -> Vec<Frame> {
        let mut frames = Vec::new();
        let mut index = 0usize;
        backtrace::trace(|frame| {
            if index >= skip {
                backtrace::resolve_frame(frame, |symbol| {
                    if let (Some(path), Some(line)) = (symbol.filename(), symbol.lineno()) {
                        frames.push(Frame::new(path.to_string_lossy().replace('\\', "/"), line));
                    }
                });
            }
            index += 1;
            index < skip + max
        });
        frames
    }
}

/// Frames taken by the resolver itself and the logger entry point.
pub const BASE_SKIP: usize = 2;

/// Upper bound on frames inspected per lookup.
pub const MAX_DEPTH: usize = 64;

const DEPENDENCY_ROOTS: [&str; 3] = ["/.cargo/registry/", "/.cargo/git/", "/rustc/"];

pub struct CallSiteResolver {
    base_skip: usize,
    depth: usize,
    internal_roots: Vec<String>,
    source: Box<dyn FrameSource>,
}

impl std::fmt::Debug for CallSiteResolver {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CallSiteResolver")
            .field("base_skip", &self.base_skip)
            .field("depth", &self.depth)
            .field("internal_roots", &self.internal_roots)
            .finish_non_exhaustive()
    }
}

impl Default for CallSiteResolver {
    fn default() -> Self {
        Self::new(BacktraceFrames)
    }
}

impl CallSiteResolver {
    /// Resolver treating this crate's sources and all dependency roots as internal.
    pub fn new(source: impl FrameSource + 'static) -> Self {
        let mut internal_roots = vec![concat!(env!("CARGO_MANIFEST_DIR"), "/src/").replace('\\', "/")];
        internal_roots.extend(DEPENDENCY_ROOTS.iter().map(|root| root.to_string()));
        Self {
            base_skip: BASE_SKIP,
            depth: MAX_DEPTH,
            internal_roots,
            source: Box::new(source),
        }
    }

    pub fn with_base_skip(mut self, base_skip: usize) -> Self {
        self.base_skip = base_skip;
        self
    }

    pub fn with_internal_roots(mut self, roots: Vec<String>) -> Self {
        self.internal_roots = roots;
        self
    }

    /// `file:line` of the first application frame, or an empty string.
    pub fn resolve(&self, extra_skip: usize) -> String {
        self.source
            .frames(self.base_skip + extra_skip, self.depth)
            .into_iter()
            .find(|frame| !self.is_skipped(&frame.file))
            .map(|frame| format!("{}:{}", frame.file, frame.line))
            .unwrap_or_default()
    }

    fn is_skipped(&self, file: &str) -> bool {
        let internal = self.internal_roots.iter().any(|root| file.contains(root.as_str()));
        (internal && !is_test_file(file)) || is_generated_file(file)
    }
}

fn is_test_file(file: &str) -> bool {
    file.contains("/tests/") || file.ends_with("_test.rs") || file.ends_with("tests.rs")
}

fn is_generated_file(file: &str) -> bool {
    file.ends_with(".gen.rs") || (file.contains("/build/") && file.contains("/out/"))
}
