/*
 *  layout.rs
 *
 *  SkyPane - weather worth watching
 *  (c) 2025-26 SkyPane contributors
 *
 *  Aspect-ratio driven layout selection
 *
 *  This program is free software: you can redistribute it and/or modify
 *  it under the terms of the GNU General Public License as published by
 *  the Free Software Foundation, either version 3 of the License, or
 *  (at your option) any later version.
 *
 *  This program is distributed in the hope that it will be useful,
 *  but WITHOUT ANY WARRANTY; without even the implied warranty of
 *  MERCHANTABILITY or FITNESS FOR A PARTICULAR PURPOSE.  See the
 *  GNU General Public License for more details.
 *
 *  See <http://www.gnu.org/licenses/> to get a copy of the GNU General
 *  Public License.
 *
 */

use std::fmt;

/// One of the five presentation templates.
///
/// The selector is decoupled from the templates themselves: adding a
/// template means adding a variant and a bucket here, nothing else.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LayoutKind {
    /// Ultra-landscape ribbon (menu boards, LED strips).
    Wide,
    /// Standard landscape, the common 16:9 signage panel.
    Horizontal,
    /// Roughly square panels.
    Square,
    /// Portrait.
    Vertical,
    /// Extreme portrait (door-edge and pillar displays).
    Tall,
}

impl fmt::Display for LayoutKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            LayoutKind::Wide => "wide",
            LayoutKind::Horizontal => "horizontal",
            LayoutKind::Square => "square",
            LayoutKind::Vertical => "vertical",
            LayoutKind::Tall => "tall",
        };
        f.write_str(s)
    }
}

/// Map a screen aspect ratio (width / height) to a layout template.
///
/// Total over the positive reals, no gaps or overlaps. Boundaries are
/// half-open: exactly 2.2 is Horizontal (not Wide), exactly 1.2 and 0.8
/// are Square, exactly 0.45 is Vertical.
/// Re-evaluated live on host resize/rotation; switching layouts never
/// touches weather state.
pub fn select_layout(aspect_ratio: f64) -> LayoutKind {
    if aspect_ratio > 2.2 {
        LayoutKind::Wide
    } else if aspect_ratio > 1.2 {
        LayoutKind::Horizontal
    } else if aspect_ratio >= 0.8 {
        LayoutKind::Square
    } else if aspect_ratio >= 0.45 {
        LayoutKind::Vertical
    } else {
        LayoutKind::Tall
    }
}
