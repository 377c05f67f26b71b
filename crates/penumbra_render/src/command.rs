//! Shadow Command Abstraction
//!
//! The allocator never touches GPU resources itself. It describes atlas
//! lifetimes and tile draws through a [`ShadowCommandSink`], which a backend
//! executes immediately or records for later replay.
//!
//! # Command Order
//!
//! Per frame: acquire (or placeholder) the directional atlas and draw its
//! tiles, acquire or alias the other atlas and draw its tiles, then release
//! both at cleanup.

use glam::{Mat4, Vec4};
use serde::{Deserialize, Serialize};

use crate::shadow::{AtlasDescriptor, AtlasKind, Viewport};

/// One shadow-casting draw into an atlas tile
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct ShadowDraw {
    /// Target atlas
    pub atlas: AtlasKind,
    /// Light whose casters are drawn
    pub visible_index: usize,
    /// Tile index inside the atlas
    pub tile_index: usize,
    /// Pixel rectangle of the tile
    pub viewport: Viewport,
    /// World to light-view transform
    pub view: Mat4,
    /// Light-view to clip transform
    pub projection: Mat4,
    /// Slope-scaled depth bias
    pub slope_scale_bias: f32,
    /// Cascade blend culling factor (directional only)
    pub cascade_culling_factor: Option<f32>,
    /// Cascade culling sphere (directional only)
    pub culling_sphere: Option<Vec4>,
    /// Clamp casters behind the near plane onto it
    pub pancaking: bool,
}

/// Receiver of the allocator's resource and draw requests
pub trait ShadowCommandSink {
    /// Get a frame-lifetime atlas texture
    fn acquire_atlas(&mut self, descriptor: AtlasDescriptor);

    /// Bind `target`'s sampler to `source`'s texture
    fn alias_atlas(&mut self, target: AtlasKind, source: AtlasKind);

    /// Return an atlas texture to the pool
    fn release_atlas(&mut self, kind: AtlasKind);

    /// Draw the shadow casters of one tile
    fn draw_shadows(&mut self, draw: &ShadowDraw);
}

/// A recorded sink call
#[derive(Clone, Debug, PartialEq)]
pub enum ShadowCommand {
    /// Atlas acquired
    Acquire(AtlasDescriptor),
    /// Atlas sampler aliased
    Alias {
        /// Sampler being bound
        target: AtlasKind,
        /// Texture it shares
        source: AtlasKind,
    },
    /// Atlas released
    Release(AtlasKind),
    /// Tile draw
    Draw(ShadowDraw),
}

impl ShadowCommand {
    /// Whether this is a tile draw
    pub fn is_draw(&self) -> bool {
        matches!(self, Self::Draw(_))
    }
}

/// Summary of a recorded frame
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct ShadowCommandStats {
    /// Atlases acquired
    pub acquires: u32,
    /// Atlas aliases
    pub aliases: u32,
    /// Atlases released
    pub releases: u32,
    /// Draws into the directional atlas
    pub directional_draws: u32,
    /// Draws into the other atlas
    pub other_draws: u32,
}

/// Recording [`ShadowCommandSink`]
#[derive(Clone, Debug, Default)]
pub struct ShadowCommandList {
    commands: Vec<ShadowCommand>,
}

impl ShadowCommandList {
    /// Create an empty list
    pub fn new() -> Self {
        Self::default()
    }

    /// Commands in submission order
    pub fn commands(&self) -> &[ShadowCommand] {
        &self.commands
    }

    /// Tile draws in submission order
    pub fn draws(&self) -> impl Iterator<Item = &ShadowDraw> {
        self.commands.iter().filter_map(|command| match command {
            ShadowCommand::Draw(draw) => Some(draw),
            _ => None,
        })
    }

    /// Tile draws into one atlas
    pub fn draws_into(&self, atlas: AtlasKind) -> impl Iterator<Item = &ShadowDraw> {
        self.draws().filter(move |draw| draw.atlas == atlas)
    }

    /// Count commands by kind
    pub fn stats(&self) -> ShadowCommandStats {
        let mut stats = ShadowCommandStats::default();
        for command in &self.commands {
            match command {
                ShadowCommand::Acquire(_) => stats.acquires += 1,
                ShadowCommand::Alias { .. } => stats.aliases += 1,
                ShadowCommand::Release(_) => stats.releases += 1,
                ShadowCommand::Draw(draw) => match draw.atlas {
                    AtlasKind::Directional => stats.directional_draws += 1,
                    AtlasKind::Other => stats.other_draws += 1,
                },
            }
        }
        stats
    }

    /// Replay into another sink
    pub fn replay(&self, sink: &mut dyn ShadowCommandSink) {
        for command in &self.commands {
            match command {
                ShadowCommand::Acquire(descriptor) => sink.acquire_atlas(*descriptor),
                ShadowCommand::Alias { target, source } => sink.alias_atlas(*target, *source),
                ShadowCommand::Release(kind) => sink.release_atlas(*kind),
                ShadowCommand::Draw(draw) => sink.draw_shadows(draw),
            }
        }
    }

    /// Number of recorded commands
    pub fn len(&self) -> usize {
        self.commands.len()
    }

    /// Check if nothing was recorded
    pub fn is_empty(&self) -> bool {
        self.commands.is_empty()
    }

    /// Clear all commands
    pub fn clear(&mut self) {
        self.commands.clear();
    }
}

impl ShadowCommandSink for ShadowCommandList {
    fn acquire_atlas(&mut self, descriptor: AtlasDescriptor) {
        self.commands.push(ShadowCommand::Acquire(descriptor));
    }

    fn alias_atlas(&mut self, target: AtlasKind, source: AtlasKind) {
        self.commands.push(ShadowCommand::Alias { target, source });
    }

    fn release_atlas(&mut self, kind: AtlasKind) {
        self.commands.push(ShadowCommand::Release(kind));
    }

    fn draw_shadows(&mut self, draw: &ShadowDraw) {
        self.commands.push(ShadowCommand::Draw(*draw));
    }
}
