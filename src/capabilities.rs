//! Capability negotiation.
//!
//! [`CapabilityTable::negotiate`] reads the driver once and records what it
//! can actually do: the version, the extension set, which optional feature
//! groups resolved completely, and a handful of numeric limits. Drivers are
//! known to advertise extensions whose entry points are missing and to report
//! versions they do not implement, so both are cross-checked against symbol
//! resolution before anything is advertised to callers.

use std::fmt;

use crate::extensions::ExtensionSet;
use crate::surface::{EntryPoint, HardwareSurface};
use crate::version::GlVersion;

/// `GL_MAX_CLIP_PLANES` (compatibility profile; same value as
/// `GL_MAX_CLIP_DISTANCES`).
const MAX_CLIP_PLANES: u32 = 0x0D32;

/// `GL_MAX_TEXTURE_MAX_ANISOTROPY_EXT`.
const MAX_TEXTURE_MAX_ANISOTROPY_EXT: u32 = 0x84FF;

/// Upper bound on `glGetError` calls when draining the error flag. A lost
/// context may report an error on every call.
const MAX_ERROR_DRAIN: usize = 64;

const GROUP_COUNT: usize = 6;

/// Optional bundles of driver functionality that are exposed all-or-nothing.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum FeatureGroup {
    /// `GL_ARB_debug_output`.
    DebugOutput,
    /// `GL_ARB_vertex_buffer_object`.
    BufferObjects,
    /// `GL_ARB_texture_buffer_object`.
    TextureBufferObjects,
    /// `GL_ARB_draw_instanced`.
    Instancing,
    /// `GL_EXT_framebuffer_object`.
    FramebufferObjects,
    /// `GL_EXT_geometry_shader4`.
    GeometryShader,
}

impl FeatureGroup {
    /// Every group, in probe order.
    pub const ALL: [Self; GROUP_COUNT] = [
        Self::DebugOutput,
        Self::BufferObjects,
        Self::TextureBufferObjects,
        Self::Instancing,
        Self::FramebufferObjects,
        Self::GeometryShader,
    ];

    /// The extension that advertises this group.
    #[must_use]
    pub fn extension(self) -> &'static str {
        match self {
            Self::DebugOutput => "GL_ARB_debug_output",
            Self::BufferObjects => "GL_ARB_vertex_buffer_object",
            Self::TextureBufferObjects => "GL_ARB_texture_buffer_object",
            Self::Instancing => "GL_ARB_draw_instanced",
            Self::FramebufferObjects => "GL_EXT_framebuffer_object",
            Self::GeometryShader => "GL_EXT_geometry_shader4",
        }
    }

    /// Entry points that must all resolve for the group to be usable.
    #[must_use]
    pub fn entry_points(self) -> &'static [&'static str] {
        match self {
            Self::DebugOutput => &[
                "glDebugMessageControlARB",
                "glDebugMessageInsertARB",
                "glDebugMessageCallbackARB",
                "glGetDebugMessageLogARB",
            ],
            Self::BufferObjects => &[
                "glGenBuffersARB",
                "glBindBufferARB",
                "glBufferDataARB",
                "glDeleteBuffersARB",
            ],
            Self::TextureBufferObjects => &["glTexBufferARB"],
            Self::Instancing => &["glDrawArraysInstancedARB", "glDrawElementsInstancedARB"],
            Self::FramebufferObjects => &[
                "glGenFramebuffersEXT",
                "glDeleteFramebuffersEXT",
                "glBindFramebufferEXT",
                "glFramebufferTexture2DEXT",
                "glCheckFramebufferStatusEXT",
                "glGenRenderbuffersEXT",
                "glDeleteRenderbuffersEXT",
                "glBindRenderbufferEXT",
                "glRenderbufferStorageEXT",
                "glFramebufferRenderbufferEXT",
                "glGenerateMipmapEXT",
            ],
            Self::GeometryShader => &["glProgramParameteriEXT"],
        }
    }

    fn index(self) -> usize {
        self as usize
    }
}

const TIER_COUNT: usize = 5;

/// Tiers of core functionality, checked in ascending order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum CoreTier {
    /// OpenGL 1.2: 3D textures, blend color, ranged draws.
    Gl12,
    /// OpenGL 1.3: multitexture, compressed textures.
    Gl13,
    /// OpenGL 1.4: separate blend functions, multi-draw.
    Gl14,
    /// OpenGL 1.5: buffer objects, occlusion queries.
    Gl15,
    /// OpenGL 2.0: programmable shading.
    Gl20,
}

impl CoreTier {
    /// The ladder, lowest tier first.
    pub const LADDER: [Self; TIER_COUNT] = [Self::Gl12, Self::Gl13, Self::Gl14, Self::Gl15, Self::Gl20];

    /// Advertised version when nothing above the fixed-function baseline
    /// resolves.
    pub const BASELINE: GlVersion = GlVersion::new(1, 1);

    fn index(self) -> usize {
        self as usize
    }

    /// Minimum version the driver must report for this tier.
    #[must_use]
    pub fn version(self) -> GlVersion {
        match self {
            Self::Gl12 => GlVersion::new(1, 2),
            Self::Gl13 => GlVersion::new(1, 3),
            Self::Gl14 => GlVersion::new(1, 4),
            Self::Gl15 => GlVersion::new(1, 5),
            Self::Gl20 => GlVersion::new(2, 0),
        }
    }

    /// Entry points introduced by this tier.
    #[must_use]
    pub fn entry_points(self) -> &'static [&'static str] {
        match self {
            Self::Gl12 => &[
                "glBlendColor",
                "glBlendEquation",
                "glDrawRangeElements",
                "glTexImage3D",
                "glTexSubImage3D",
                "glCopyTexSubImage3D",
            ],
            Self::Gl13 => &[
                "glActiveTexture",
                "glSampleCoverage",
                "glCompressedTexImage3D",
                "glCompressedTexImage2D",
                "glCompressedTexImage1D",
                "glCompressedTexSubImage3D",
                "glCompressedTexSubImage2D",
                "glCompressedTexSubImage1D",
                "glGetCompressedTexImage",
            ],
            Self::Gl14 => &[
                "glBlendFuncSeparate",
                "glMultiDrawArrays",
                "glMultiDrawElements",
                "glPointParameterf",
                "glPointParameterfv",
                "glPointParameteri",
                "glPointParameteriv",
            ],
            Self::Gl15 => &[
                "glGenQueries",
                "glDeleteQueries",
                "glIsQuery",
                "glBeginQuery",
                "glEndQuery",
                "glGetQueryiv",
                "glGetQueryObjectiv",
                "glGetQueryObjectuiv",
                "glBindBuffer",
                "glDeleteBuffers",
                "glGenBuffers",
                "glIsBuffer",
                "glBufferData",
                "glBufferSubData",
                "glGetBufferSubData",
                "glMapBuffer",
                "glUnmapBuffer",
                "glGetBufferParameteriv",
                "glGetBufferPointerv",
            ],
            Self::Gl20 => &[
                "glBlendEquationSeparate",
                "glDrawBuffers",
                "glStencilOpSeparate",
                "glStencilFuncSeparate",
                "glStencilMaskSeparate",
                "glAttachShader",
                "glBindAttribLocation",
                "glCompileShader",
                "glCreateProgram",
                "glCreateShader",
                "glDeleteProgram",
                "glDeleteShader",
                "glDetachShader",
                "glDisableVertexAttribArray",
                "glEnableVertexAttribArray",
                "glGetActiveAttrib",
                "glGetActiveUniform",
                "glGetAttachedShaders",
                "glGetAttribLocation",
                "glGetProgramiv",
                "glGetProgramInfoLog",
                "glGetShaderiv",
                "glGetShaderInfoLog",
                "glGetShaderSource",
                "glGetUniformLocation",
                "glGetUniformfv",
                "glGetUniformiv",
                "glGetVertexAttribfv",
                "glGetVertexAttribiv",
                "glGetVertexAttribPointerv",
                "glIsProgram",
                "glIsShader",
                "glLinkProgram",
                "glShaderSource",
                "glUseProgram",
                "glUniform1f",
                "glUniform4fv",
                "glUniformMatrix4fv",
                "glValidateProgram",
                "glVertexAttribPointer",
            ],
        }
    }
}

/// Entry points of a group that resolved completely.
#[derive(Clone, PartialEq, Eq)]
pub struct ResolvedGroup {
    entry_points: Vec<(&'static str, EntryPoint)>,
}

impl ResolvedGroup {
    /// Resolve every name, or nothing at all.
    fn resolve(surface: &dyn HardwareSurface, names: &[&'static str]) -> Option<Self> {
        let mut entry_points = Vec::with_capacity(names.len());
        for &name in names {
            let Some(entry) = surface.proc_address(name) else {
                log::debug!("entry point {name} did not resolve");
                return None;
            };
            entry_points.push((name, entry));
        }
        Some(Self { entry_points })
    }

    /// Look up one resolved entry point by name.
    #[must_use]
    pub fn get(&self, name: &str) -> Option<EntryPoint> {
        self.entry_points
            .iter()
            .find_map(|&(n, entry)| (n == name).then_some(entry))
    }

    /// Number of resolved entry points.
    #[must_use]
    pub fn len(&self) -> usize {
        self.entry_points.len()
    }

    /// Always `false` for a group built from a non-empty name list.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.entry_points.is_empty()
    }
}

impl fmt::Debug for ResolvedGroup {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_list()
            .entries(self.entry_points.iter().map(|(name, _)| name))
            .finish()
    }
}

/// Availability of one [`FeatureGroup`].
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub enum GroupState {
    /// Not advertised, or advertised with missing entry points.
    #[default]
    Unavailable,
    /// Advertised and every entry point resolved.
    Available(ResolvedGroup),
}

impl GroupState {
    /// Whether the group can be used.
    #[must_use]
    pub fn is_available(&self) -> bool {
        matches!(self, Self::Available(_))
    }

    /// The resolved entry points, if available.
    #[must_use]
    pub fn resolved(&self) -> Option<&ResolvedGroup> {
        match self {
            Self::Available(group) => Some(group),
            Self::Unavailable => None,
        }
    }
}

/// Extensions that only need a yes/no answer.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
#[allow(clippy::struct_excessive_bools)]
pub struct ExtensionFlags {
    /// `GL_ARB_texture_non_power_of_two`.
    pub npot_textures: bool,
    /// `GL_EXT_bgra`.
    pub bgra: bool,
    /// `GL_EXT_texture_filter_anisotropic`.
    pub anisotropic_filtering: bool,
    /// `GL_EXT_packed_depth_stencil`.
    pub packed_depth_stencil: bool,
    /// `GL_ATI_meminfo`.
    pub ati_meminfo: bool,
    /// `GL_NVX_gpu_memory_info`.
    pub nvx_gpu_memory_info: bool,
}

impl ExtensionFlags {
    fn from_extensions(extensions: &ExtensionSet) -> Self {
        Self {
            npot_textures: extensions.contains("GL_ARB_texture_non_power_of_two"),
            bgra: extensions.contains("GL_EXT_bgra"),
            anisotropic_filtering: extensions.contains("GL_EXT_texture_filter_anisotropic"),
            packed_depth_stencil: extensions.contains("GL_EXT_packed_depth_stencil"),
            ati_meminfo: extensions.contains("GL_ATI_meminfo"),
            nvx_gpu_memory_info: extensions.contains("GL_NVX_gpu_memory_info"),
        }
    }
}

/// Numeric limits, each falling back to a documented minimum.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Limits {
    /// User clip planes. Defaults to 6, the minimum the API guarantees.
    pub max_clip_planes: i32,
    /// Largest texture dimension. Defaults to 1024.
    pub max_texture_size: i32,
    /// Maximum anisotropy. Defaults to 1 (no anisotropic filtering).
    pub max_anisotropy: i32,
    /// Whether the default framebuffer has left/right buffers.
    pub stereo: bool,
}

impl Limits {
    /// Default for [`max_clip_planes`](Self::max_clip_planes).
    pub const DEFAULT_CLIP_PLANES: i32 = 6;
    /// Default for [`max_texture_size`](Self::max_texture_size).
    pub const DEFAULT_TEXTURE_SIZE: i32 = 1024;
    /// Default for [`max_anisotropy`](Self::max_anisotropy).
    pub const DEFAULT_ANISOTROPY: i32 = 1;

    fn query(surface: &dyn HardwareSurface, flags: &ExtensionFlags) -> Self {
        let mut limits = Self {
            max_clip_planes: query_limit(surface, MAX_CLIP_PLANES, Self::DEFAULT_CLIP_PLANES),
            max_texture_size: query_limit(surface, glow::MAX_TEXTURE_SIZE, Self::DEFAULT_TEXTURE_SIZE),
            ..Self::default()
        };
        let stereo = surface.get_integer(glow::STEREO);
        if surface.get_error() == glow::NO_ERROR {
            limits.stereo = stereo == 1;
        } else {
            reset_errors(surface);
        }
        if flags.anisotropic_filtering {
            limits.max_anisotropy = query_limit(
                surface,
                MAX_TEXTURE_MAX_ANISOTROPY_EXT,
                Self::DEFAULT_ANISOTROPY,
            );
        }
        limits
    }
}

impl Default for Limits {
    fn default() -> Self {
        Self {
            max_clip_planes: Self::DEFAULT_CLIP_PLANES,
            max_texture_size: Self::DEFAULT_TEXTURE_SIZE,
            max_anisotropy: Self::DEFAULT_ANISOTROPY,
            stereo: false,
        }
    }
}

fn query_limit(surface: &dyn HardwareSurface, pname: u32, default: i32) -> i32 {
    let value = surface.get_integer(pname);
    if surface.get_error() != glow::NO_ERROR {
        reset_errors(surface);
        log::debug!("limit query {pname:#06x} failed, using {default}");
        return default;
    }
    if value <= 0 {
        log::debug!("limit query {pname:#06x} returned {value}, using {default}");
        return default;
    }
    value
}

/// Drain pending error flags so stale errors are not blamed on later calls.
pub(crate) fn reset_errors(surface: &dyn HardwareSurface) {
    for _ in 0..MAX_ERROR_DRAIN {
        if surface.get_error() == glow::NO_ERROR {
            return;
        }
    }
    log::warn!("error flag did not clear after {MAX_ERROR_DRAIN} reads; context lost?");
}

/// Read the version, preferring the integer queries.
fn read_version(surface: &dyn HardwareSurface) -> GlVersion {
    let major = surface.get_integer(glow::MAJOR_VERSION);
    let minor = surface.get_integer(glow::MINOR_VERSION);
    // Some drivers do not flag an error for the unknown enums and simply
    // leave the outputs untouched, so the values are checked as well.
    if surface.get_error() == glow::NO_ERROR {
        if let (Ok(major @ 1..), Ok(minor)) = (u32::try_from(major), u32::try_from(minor)) {
            return GlVersion::new(major, minor);
        }
    }
    reset_errors(surface);
    surface
        .get_string(glow::VERSION)
        .map_or(GlVersion::UNKNOWN, |s| GlVersion::parse(&s))
}

/// Outcome of climbing the core ladder.
struct Ladder {
    /// Resolved entry points of every satisfied tier.
    tiers: [GroupState; TIER_COUNT],
    /// Last satisfied tier.
    satisfied: Option<CoreTier>,
    /// Version to advertise.
    version: GlVersion,
}

/// Climb the core ladder, stopping at the first tier that is either above
/// the reported version or missing an entry point.
fn climb_ladder(surface: &dyn HardwareSurface, reported: GlVersion) -> Ladder {
    let mut ladder = Ladder {
        tiers: std::array::from_fn(|_| GroupState::Unavailable),
        satisfied: None,
        version: reported,
    };
    for tier in CoreTier::LADDER {
        let resolved = if reported >= tier.version() {
            ResolvedGroup::resolve(surface, tier.entry_points())
        } else {
            None
        };
        let Some(resolved) = resolved else {
            let ceiling = ladder.satisfied.map_or(CoreTier::BASELINE, CoreTier::version);
            ladder.version = reported.min(ceiling);
            if ladder.version != reported {
                log::warn!(
                    "driver reports OpenGL {reported} but {tier:?} is incomplete; advertising {}",
                    ladder.version
                );
            }
            break;
        };
        ladder.tiers[tier.index()] = GroupState::Available(resolved);
        ladder.satisfied = Some(tier);
    }
    ladder
}

/// Everything the driver was found to support. Immutable once built.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CapabilityTable {
    reported_version: GlVersion,
    version: GlVersion,
    extensions: ExtensionSet,
    groups: [GroupState; GROUP_COUNT],
    core_tier: Option<CoreTier>,
    core: [GroupState; TIER_COUNT],
    flags: ExtensionFlags,
    limits: Limits,
}

impl Default for CapabilityTable {
    /// The table of a context that never initialized: version 0.0, nothing
    /// available, limits at their defaults.
    fn default() -> Self {
        Self {
            reported_version: GlVersion::UNKNOWN,
            version: GlVersion::UNKNOWN,
            extensions: ExtensionSet::default(),
            groups: std::array::from_fn(|_| GroupState::Unavailable),
            core_tier: None,
            core: std::array::from_fn(|_| GroupState::Unavailable),
            flags: ExtensionFlags::default(),
            limits: Limits::default(),
        }
    }
}

impl CapabilityTable {
    /// Probe the driver. Reads only; every failure degrades to "unsupported".
    pub fn negotiate(surface: &dyn HardwareSurface) -> Self {
        let reported_version = read_version(surface);
        reset_errors(surface);

        let extensions = ExtensionSet::query(surface, reported_version);
        let flags = ExtensionFlags::from_extensions(&extensions);

        let groups = FeatureGroup::ALL.map(|group| {
            if !extensions.contains(group.extension()) {
                return GroupState::Unavailable;
            }
            match ResolvedGroup::resolve(surface, group.entry_points()) {
                Some(resolved) => GroupState::Available(resolved),
                None => {
                    log::debug!(
                        "{} advertised but incomplete; {group:?} disabled",
                        group.extension()
                    );
                    GroupState::Unavailable
                }
            }
        });

        let Ladder {
            tiers: core,
            satisfied: core_tier,
            version,
        } = climb_ladder(surface, reported_version);
        let limits = Limits::query(surface, &flags);

        log::debug!(
            "OpenGL {version} (reported {reported_version}), {} extensions, core tier {core_tier:?}",
            extensions.len()
        );

        Self {
            reported_version,
            version,
            extensions,
            groups,
            core_tier,
            core,
            flags,
            limits,
        }
    }

    /// Effective version after the core-tier check.
    #[must_use]
    pub fn version(&self) -> GlVersion {
        self.version
    }

    /// Version as the driver reported it.
    #[must_use]
    pub fn reported_version(&self) -> GlVersion {
        self.reported_version
    }

    /// Whether the effective version is at least `major.minor`.
    #[must_use]
    pub fn is_gl_greater_equal(&self, major: u32, minor: u32) -> bool {
        self.version >= GlVersion::new(major, minor)
    }

    /// The advertised extension set.
    #[must_use]
    pub fn extensions(&self) -> &ExtensionSet {
        &self.extensions
    }

    /// Exact-name extension check.
    #[must_use]
    pub fn has_extension(&self, name: &str) -> bool {
        self.extensions.contains(name)
    }

    /// State of one feature group.
    #[must_use]
    pub fn group(&self, group: FeatureGroup) -> &GroupState {
        &self.groups[group.index()]
    }

    /// Whether a feature group is usable.
    #[must_use]
    pub fn has_group(&self, group: FeatureGroup) -> bool {
        self.group(group).is_available()
    }

    /// Highest core tier that fully resolved.
    #[must_use]
    pub fn core_tier(&self) -> Option<CoreTier> {
        self.core_tier
    }

    /// Entry points of a core tier. Available for every tier up to
    /// [`core_tier`](Self::core_tier), unavailable above it.
    #[must_use]
    pub fn core(&self, tier: CoreTier) -> &GroupState {
        &self.core[tier.index()]
    }

    /// Yes/no extensions.
    #[must_use]
    pub fn flags(&self) -> &ExtensionFlags {
        &self.flags
    }

    /// Numeric limits.
    #[must_use]
    pub fn limits(&self) -> &Limits {
        &self.limits
    }
}
