//! Display domain types
//!
//! - [`DisplayMode`] - parsed `<width>x<height><p|i>-<refresh>` mode strings
//! - [`choose_default_mode`] - default mode negotiation on attach
//! - [`DisplaySettings`] - per-slot user configuration
//! - [`DisplayCommand`] / [`OperateCode`] - configuration requests sent to
//!   the display compositor

use std::{fmt, str::FromStr};

use serde::{Deserialize, Serialize};

use super::errors::DomainError;

// ============================================================================
// DisplayMode
// ============================================================================

/// Progressive or interlaced scan
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ScanType {
    Progressive,
    Interlaced,
}

impl ScanType {
    fn as_char(&self) -> char {
        match self {
            ScanType::Progressive => 'p',
            ScanType::Interlaced => 'i',
        }
    }
}

/// A display mode parsed from the daemon's textual form
///
/// Mode strings look like `1920x1080p-60`; the daemon may prefix them
/// with a tag such as `S:` or `D:`, which is skipped.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct DisplayMode {
    pub width: u32,
    pub height: u32,
    pub scan: ScanType,
    pub refresh: u32,
}

impl DisplayMode {
    /// True if width, height and refresh are all `<=` those of `other`
    pub fn fits_within(&self, other: &DisplayMode) -> bool {
        self.width <= other.width && self.height <= other.height && self.refresh <= other.refresh
    }
}

fn parse_field(mode: &str, field: &str, digits: &str) -> Result<u32, DomainError> {
    digits
        .parse::<u32>()
        .map_err(|e| DomainError::InvalidDisplayMode {
            mode: mode.to_string(),
            reason: format!("bad {field} '{digits}': {e}"),
        })
}

impl FromStr for DisplayMode {
    type Err = DomainError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let invalid = |reason: &str| DomainError::InvalidDisplayMode {
            mode: s.to_string(),
            reason: reason.to_string(),
        };

        let start = s
            .find(|c: char| c.is_ascii_digit())
            .ok_or_else(|| invalid("missing width"))?;
        let body = &s[start..];

        let (width, rest) = body.split_once('x').ok_or_else(|| invalid("missing 'x'"))?;
        let scan_at = rest
            .find(['p', 'i'])
            .ok_or_else(|| invalid("missing scan type"))?;
        let (height, rest) = rest.split_at(scan_at);
        let scan = if rest.starts_with('p') {
            ScanType::Progressive
        } else {
            ScanType::Interlaced
        };
        let refresh = rest[1..]
            .strip_prefix('-')
            .ok_or_else(|| invalid("missing refresh rate"))?;

        Ok(DisplayMode {
            width: parse_field(s, "width", width)?,
            height: parse_field(s, "height", height)?,
            scan,
            refresh: parse_field(s, "refresh", refresh)?,
        })
    }
}

impl fmt::Display for DisplayMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{}x{}{}-{}",
            self.width,
            self.height,
            self.scan.as_char(),
            self.refresh
        )
    }
}

// ============================================================================
// Default mode selection
// ============================================================================

/// Why a mode was chosen
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ModeChoiceReason {
    /// The configured mode is offered verbatim
    Exact,
    /// First offered mode not larger than the configured one
    Downgrade,
    /// Nothing fit (or nothing was configured); first offered mode
    FirstListed,
    /// A mode string failed to parse; first offered mode
    ParseFailure(DomainError),
}

/// Result of [`choose_default_mode`]
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ModeChoice {
    pub mode: String,
    pub reason: ModeChoiceReason,
}

/// Looks for `requested` in `available`, else the first entry whose width,
/// height and refresh all fit within it.
///
/// Returns `Ok(None)` when nothing fits. Any unparseable mode string
/// (requested or offered) aborts the search with an error.
pub fn select_mode(requested: &str, available: &[String]) -> Result<Option<String>, DomainError> {
    if available.iter().any(|m| m == requested) {
        return Ok(Some(requested.to_string()));
    }

    let wanted: DisplayMode = requested.parse()?;
    for candidate in available {
        let offered: DisplayMode = candidate.parse()?;
        if offered.fits_within(&wanted) {
            return Ok(Some(candidate.clone()));
        }
    }
    Ok(None)
}

/// Picks the mode to use for a freshly attached display
///
/// Returns `None` only when the daemon offered no modes at all.
pub fn choose_default_mode(requested: Option<&str>, available: &[String]) -> Option<ModeChoice> {
    let first = available.first()?.clone();

    let Some(requested) = requested else {
        return Some(ModeChoice {
            mode: first,
            reason: ModeChoiceReason::FirstListed,
        });
    };

    let choice = match select_mode(requested, available) {
        Ok(Some(mode)) if mode == requested => ModeChoice {
            mode,
            reason: ModeChoiceReason::Exact,
        },
        Ok(Some(mode)) => ModeChoice {
            mode,
            reason: ModeChoiceReason::Downgrade,
        },
        Ok(None) => ModeChoice {
            mode: first,
            reason: ModeChoiceReason::FirstListed,
        },
        Err(e) => ModeChoice {
            mode: first,
            reason: ModeChoiceReason::ParseFailure(e),
        },
    };
    Some(choice)
}

// ============================================================================
// DisplaySettings
// ============================================================================

/// User configuration of one logical display slot
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct DisplaySettings {
    /// Configured mode, if any
    pub mode: Option<String>,
    /// Output enabled
    pub enabled: bool,
    /// Mirror the primary display
    pub mirror: bool,
    /// Rotated output
    pub rotation: bool,
    /// Overscan ratio
    pub overscan: i32,
    /// Color depth in bits per pixel (0 = driver default)
    pub color_depth: u32,
}

// ============================================================================
// DisplayCommand
// ============================================================================

/// Operation bits of a [`DisplayCommand`]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct OperateCode(u32);

impl OperateCode {
    pub const ENABLE: OperateCode = OperateCode(0x1000);
    pub const DISABLE: OperateCode = OperateCode(0x2000);
    pub const CHANGE: OperateCode = OperateCode(0x4000);

    pub const CHANGE_RESOLUTION: OperateCode = OperateCode(0x1);
    pub const CHANGE_OVERSCAN: OperateCode = OperateCode(0x2);
    pub const CHANGE_MIRROR: OperateCode = OperateCode(0x4);
    pub const CHANGE_COLORDEPTH: OperateCode = OperateCode(0x8);
    pub const CHANGE_ROTATION: OperateCode = OperateCode(0x10);

    const ALL_CHANGES: u32 = 0x1 | 0x2 | 0x4 | 0x8 | 0x10;

    /// Raw bit pattern
    pub const fn bits(&self) -> u32 {
        self.0
    }

    /// True if every bit of `other` is set
    pub const fn contains(&self, other: OperateCode) -> bool {
        self.0 & other.0 == other.0
    }
}

impl std::ops::BitOr for OperateCode {
    type Output = OperateCode;

    fn bitor(self, rhs: Self) -> Self::Output {
        OperateCode(self.0 | rhs.0)
    }
}

impl fmt::Display for OperateCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:#06x}", self.0)
    }
}

/// A configuration request for one framebuffer
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DisplayCommand {
    /// Framebuffer the command targets
    pub framebuffer: usize,
    pub operate: OperateCode,
    pub rotation: u32,
    pub overscan: i32,
    pub mirror: bool,
    pub color_depth: u32,
    pub mode: Option<String>,
}

impl DisplayCommand {
    fn base(framebuffer: usize, operate: OperateCode) -> Self {
        Self {
            framebuffer,
            operate,
            rotation: 0,
            overscan: 0,
            mirror: false,
            color_depth: 0,
            mode: None,
        }
    }

    /// Turns a framebuffer on with its full configuration
    pub fn enable(framebuffer: usize, settings: &DisplaySettings) -> Self {
        Self {
            rotation: u32::from(settings.rotation),
            overscan: settings.overscan,
            mirror: settings.mirror,
            color_depth: settings.color_depth,
            mode: settings.mode.clone(),
            ..Self::base(
                framebuffer,
                OperateCode::ENABLE | OperateCode(OperateCode::ALL_CHANGES),
            )
        }
    }

    /// Turns a framebuffer off
    pub fn disable(framebuffer: usize) -> Self {
        Self::base(framebuffer, OperateCode::DISABLE)
    }

    /// Changes the mode
    pub fn resolution(framebuffer: usize, mode: impl Into<String>) -> Self {
        Self {
            mode: Some(mode.into()),
            ..Self::base(
                framebuffer,
                OperateCode::CHANGE | OperateCode::CHANGE_RESOLUTION,
            )
        }
    }

    /// Changes the overscan ratio
    pub fn overscan(framebuffer: usize, ratio: i32) -> Self {
        Self {
            overscan: ratio,
            ..Self::base(framebuffer, OperateCode::CHANGE | OperateCode::CHANGE_OVERSCAN)
        }
    }

    /// Toggles mirroring
    pub fn mirror(framebuffer: usize, mirror: bool) -> Self {
        Self {
            mirror,
            ..Self::base(framebuffer, OperateCode::CHANGE | OperateCode::CHANGE_MIRROR)
        }
    }

    /// Changes the color depth
    pub fn color_depth(framebuffer: usize, depth: u32) -> Self {
        Self {
            color_depth: depth,
            ..Self::base(
                framebuffer,
                OperateCode::CHANGE | OperateCode::CHANGE_COLORDEPTH,
            )
        }
    }

    /// Toggles rotation
    pub fn rotation(framebuffer: usize, rotated: bool) -> Self {
        Self {
            rotation: u32::from(rotated),
            ..Self::base(framebuffer, OperateCode::CHANGE | OperateCode::CHANGE_ROTATION)
        }
    }
}
