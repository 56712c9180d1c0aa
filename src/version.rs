//! OpenGL version numbers and the version-string parser.

use std::fmt;

/// A `major.minor` OpenGL version. `0.0` means unknown.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct GlVersion {
    /// Major number.
    pub major: u32,
    /// Minor number.
    pub minor: u32,
}

impl GlVersion {
    /// The unknown version.
    pub const UNKNOWN: Self = Self::new(0, 0);

    /// Construct a version.
    #[must_use]
    pub const fn new(major: u32, minor: u32) -> Self {
        Self { major, minor }
    }

    /// Whether this is [`UNKNOWN`](Self::UNKNOWN).
    #[must_use]
    pub fn is_unknown(self) -> bool {
        self == Self::UNKNOWN
    }

    /// Parse a `GL_VERSION` string.
    ///
    /// Only the first two dot-separated numbers are significant: drivers
    /// report things like `"4.6.0 NVIDIA 535.54"` or `"3.3 (Core Profile)
    /// Mesa 23.1"`, and the micro version and everything after it are vendor
    /// noise. OpenGL ES strings carry an `"OpenGL ES "` prefix that is
    /// skipped. Anything that does not start with `major.minor` yields
    /// [`UNKNOWN`](Self::UNKNOWN), never a partial value.
    #[must_use]
    pub fn parse(s: &str) -> Self {
        let s = s.strip_prefix("OpenGL ES ").unwrap_or(s);
        let (major, rest) = leading_number(s);
        let Some(major) = major.filter(|&m| m > 0) else {
            return Self::UNKNOWN;
        };
        let Some(rest) = rest.strip_prefix('.') else {
            return Self::UNKNOWN;
        };
        match leading_number(rest).0 {
            Some(minor) => Self::new(major, minor),
            None => Self::UNKNOWN,
        }
    }
}

/// Split off a run of ASCII digits. `None` when there are no digits or the
/// number does not fit.
fn leading_number(s: &str) -> (Option<u32>, &str) {
    let end = s.find(|c: char| !c.is_ascii_digit()).unwrap_or(s.len());
    let (digits, rest) = s.split_at(end);
    (digits.parse().ok(), rest)
}

impl fmt::Display for GlVersion {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}.{}", self.major, self.minor)
    }
}
