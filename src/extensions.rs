//! Extension discovery and exact-name matching.

use rustc_hash::FxHashSet;

use crate::surface::HardwareSurface;
use crate::version::GlVersion;

/// Whether `name` appears as a whole token in a space-separated extension
/// list.
///
/// Substring search is wrong here because extension names can be prefixes of
/// other extension names: `GL_EXT_foo` must not match `GL_EXT_foobar`.
#[must_use]
pub fn contains_token(list: &str, name: &str) -> bool {
    !name.is_empty() && list.split(' ').any(|token| token == name)
}

/// The set of extension names a driver advertises.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ExtensionSet {
    names: FxHashSet<String>,
}

impl ExtensionSet {
    /// Build a set from a legacy space-separated `GL_EXTENSIONS` string.
    #[must_use]
    pub fn from_list(list: &str) -> Self {
        list.split_ascii_whitespace().collect()
    }

    /// Query the driver.
    ///
    /// From 3.0 on the indexed query is used, since core profiles reject the
    /// legacy string. If it yields nothing the legacy string is tried anyway.
    pub fn query(surface: &dyn HardwareSurface, version: GlVersion) -> Self {
        if version >= GlVersion::new(3, 0) {
            let count = u32::try_from(surface.get_integer(glow::NUM_EXTENSIONS)).unwrap_or(0);
            let set: Self = (0..count)
                .filter_map(|i| surface.get_string_indexed(glow::EXTENSIONS, i))
                .collect();
            if !set.is_empty() {
                return set;
            }
            log::debug!("indexed extension query returned nothing, trying legacy string");
        }
        match surface.get_string(glow::EXTENSIONS) {
            Some(list) => Self::from_list(&list),
            None => {
                log::warn!("GL_EXTENSIONS query returned nothing; no current context?");
                Self::default()
            }
        }
    }

    /// Exact-name membership.
    #[must_use]
    pub fn contains(&self, name: &str) -> bool {
        self.names.contains(name)
    }

    /// Number of advertised extensions.
    #[must_use]
    pub fn len(&self) -> usize {
        self.names.len()
    }

    /// Whether the driver advertised nothing.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.names.is_empty()
    }

    /// Iterate over the advertised names in no particular order.
    pub fn iter(&self) -> impl Iterator<Item = &str> {
        self.names.iter().map(String::as_str)
    }
}

impl<S: Into<String>> FromIterator<S> for ExtensionSet {
    fn from_iter<I: IntoIterator<Item = S>>(iter: I) -> Self {
        Self {
            names: iter
                .into_iter()
                .map(Into::into)
                .filter(|name: &String| !name.is_empty())
                .collect(),
        }
    }
}
