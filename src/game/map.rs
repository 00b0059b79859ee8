//! Map geometry: world size and tile-map collider loading

use std::path::Path;

use serde::Deserialize;
use tracing::info;

use super::physics::{PhysicsWorld, Rect};

/// Map dimensions in pixels
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct MapSize {
    pub width: f32,
    pub height: f32,
}

impl MapSize {
    pub const fn new(width: f32, height: f32) -> Self {
        Self { width, height }
    }
}

/// Map loading errors
#[derive(Debug, thiserror::Error)]
pub enum MapError {
    #[error("Failed to read map file: {0}")]
    Io(#[from] std::io::Error),

    #[error("Invalid map JSON: {0}")]
    Json(#[from] serde_json::Error),

    #[error("Map layer with name {0} not found")]
    MissingLayer(String),

    #[error("Layer {layer} has {actual} tiles, expected {expected}")]
    LayerSize {
        layer: String,
        expected: usize,
        actual: usize,
    },
}

/// Tile layer as exported by the Tiled editor
#[derive(Debug, Clone, Deserialize)]
pub struct TileLayer {
    pub name: String,
    pub width: u32,
    #[serde(default)]
    pub height: u32,
    /// Global tile ids, row-major; 0 is an empty cell
    #[serde(default)]
    pub data: Vec<u32>,
}

/// Rectangle in pixels relative to a tile's top-left corner
#[derive(Debug, Clone, Copy, Deserialize)]
pub struct CollisionObject {
    pub x: f32,
    pub y: f32,
    pub width: f32,
    pub height: f32,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct ObjectGroup {
    #[serde(default)]
    pub objects: Vec<CollisionObject>,
}

/// Per-tile metadata; only collision shapes are read
#[derive(Debug, Clone, Deserialize)]
pub struct TileDefinition {
    /// Local id within the tileset
    pub id: u32,
    #[serde(default)]
    pub objectgroup: Option<ObjectGroup>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct Tileset {
    #[serde(default)]
    pub name: String,
    pub firstgid: u32,
    #[serde(default)]
    pub tiles: Vec<TileDefinition>,
}

impl Tileset {
    /// Custom collision shapes of the tile with local id `local_id`, if any
    fn collision_objects(&self, local_id: u32) -> Option<&[CollisionObject]> {
        self.tiles
            .iter()
            .find(|tile| tile.id == local_id)
            .and_then(|tile| tile.objectgroup.as_ref())
            .map(|group| group.objects.as_slice())
            .filter(|objects| !objects.is_empty())
    }
}

/// Subset of the Tiled JSON map format needed to build colliders
#[derive(Debug, Clone, Deserialize)]
pub struct TileMap {
    /// Width in tiles
    pub width: u32,
    /// Height in tiles
    pub height: u32,
    pub tilewidth: u32,
    pub tileheight: u32,
    pub layers: Vec<TileLayer>,
    #[serde(default)]
    pub tilesets: Vec<Tileset>,
}

impl TileMap {
    pub fn from_json(json: &str) -> Result<Self, MapError> {
        Ok(serde_json::from_str(json)?)
    }

    pub fn load(path: impl AsRef<Path>) -> Result<Self, MapError> {
        let json = std::fs::read_to_string(path)?;
        Self::from_json(&json)
    }

    pub fn size(&self) -> MapSize {
        MapSize::new(
            (self.width * self.tilewidth) as f32,
            (self.height * self.tileheight) as f32,
        )
    }

    /// Tileset a global tile id belongs to: the greatest `firstgid` not above it
    fn tileset_for(&self, gid: u32) -> Option<&Tileset> {
        self.tilesets
            .iter()
            .filter(|tileset| tileset.firstgid <= gid)
            .max_by_key(|tileset| tileset.firstgid)
    }

    /// Colliders for every non-empty cell of `layer_name`.
    ///
    /// A tile with custom collision objects contributes one rectangle per
    /// object; any other tile is one full-tile collider.
    pub fn colliders(&self, layer_name: &str) -> Result<Vec<Rect>, MapError> {
        let layer = self
            .layers
            .iter()
            .find(|l| l.name == layer_name)
            .ok_or_else(|| MapError::MissingLayer(layer_name.to_string()))?;

        if layer.width == 0 {
            return Ok(Vec::new());
        }

        if layer.height > 0 {
            let expected = (layer.width * layer.height) as usize;
            if layer.data.len() != expected {
                return Err(MapError::LayerSize {
                    layer: layer.name.clone(),
                    expected,
                    actual: layer.data.len(),
                });
            }
        }

        let tile_w = self.tilewidth as f32;
        let tile_h = self.tileheight as f32;

        let mut colliders = Vec::new();
        for (i, &gid) in layer.data.iter().enumerate() {
            if gid == 0 {
                continue;
            }
            let left = (i as u32 % layer.width) as f32 * tile_w;
            let top = (i as u32 / layer.width) as f32 * tile_h;

            let objects = self
                .tileset_for(gid)
                .and_then(|tileset| tileset.collision_objects(gid - tileset.firstgid));

            match objects {
                Some(objects) => colliders.extend(objects.iter().map(|object| {
                    Rect::from_corner(left + object.x, top + object.y, object.width, object.height)
                })),
                None => colliders.push(Rect::from_corner(left, top, tile_w, tile_h)),
            }
        }
        Ok(colliders)
    }

    /// Build a physics world whose static geometry is `layer_name`
    pub fn build_world(&self, layer_name: &str) -> Result<PhysicsWorld, MapError> {
        let mut world = PhysicsWorld::new(self.size());
        let colliders = self.colliders(layer_name)?;
        let count = colliders.len();
        for collider in colliders {
            world.add_static(collider);
        }

        info!(
            layer = layer_name,
            colliders = count,
            width = world.size().width,
            height = world.size().height,
            "Loaded map"
        );

        Ok(world)
    }
}
