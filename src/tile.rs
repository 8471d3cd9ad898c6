/// Slippy map tile addressing and the rectangles derived from it.
///
/// Further reading: https://wiki.openstreetmap.org/wiki/Slippy_map_tilenames
use crate::error::Error;
use crate::schema::ScalingInfo;

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

/// Axis-aligned minimum bounding rectangle.
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
pub struct Mbr {
    pub xmin: f64,
    pub ymin: f64,
    pub xmax: f64,
    pub ymax: f64,
}

impl Mbr {
    pub fn new(xmin: f64, ymin: f64, xmax: f64, ymax: f64) -> Mbr {
        Mbr {
            xmin,
            ymin,
            xmax,
            ymax,
        }
    }

    /// Maps a rectangle from the table's scaled coordinate space back into the raw space
    /// the stored geometries live in.
    pub fn unscaled(&self, scaling: &ScalingInfo) -> Mbr {
        Mbr {
            xmin: self.xmin / scaling.x,
            ymin: self.ymin / scaling.y,
            xmax: self.xmax / scaling.x,
            ymax: self.ymax / scaling.y,
        }
    }

    pub fn intersects(&self, other: &Mbr) -> bool {
        self.xmin <= other.xmax
            && other.xmin <= self.xmax
            && self.ymin <= other.ymax
            && other.ymin <= self.ymax
    }

    /// Positional query parameters in the order the synthesized SQL expects them.
    pub fn as_params(&self) -> [f64; 4] {
        [self.xmin, self.ymin, self.xmax, self.ymax]
    }
}

/// Deepest zoom level a tile id may address.
pub const MAX_ZOOM: u8 = 30;

/// A slippy map tile in XYZ format.
///
/// Ids built with [`TileId::new`] are trusted. Ids coming from outside, parsed or
/// deserialized, are checked with [`TileId::try_new`].
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "RawTileId")]
pub struct TileId {
    pub zoom: u8,
    pub x: u32,
    pub y: u32,
}

#[derive(Deserialize)]
struct RawTileId {
    zoom: u8,
    x: u32,
    y: u32,
}

impl TryFrom<RawTileId> for TileId {
    type Error = Error;

    fn try_from(raw: RawTileId) -> Result<Self, Self::Error> {
        TileId::try_new(raw.zoom, raw.x, raw.y)
    }
}

impl TileId {
    pub fn new(zoom: u8, x: u32, y: u32) -> TileId {
        TileId { zoom, x, y }
    }

    /// Builds a tile id, rejecting zoom levels above [`MAX_ZOOM`] and x/y outside of
    /// `0..2^zoom`.
    pub fn try_new(zoom: u8, x: u32, y: u32) -> Result<TileId, Error> {
        if zoom > MAX_ZOOM {
            return Err(Error::InvalidTile(format!(
                "zoom {} is above the maximum of {}",
                zoom, MAX_ZOOM
            )));
        }
        let tiles = 1u32 << zoom;
        if x >= tiles || y >= tiles {
            return Err(Error::InvalidTile(format!(
                "{}/{}/{} is outside of the {}x{} grid of zoom {}",
                zoom, x, y, tiles, tiles, zoom
            )));
        }
        Ok(TileId { zoom, x, y })
    }

    /// The tile that contains the given WGS84 position at a zoom level.
    pub fn containing(lon: f64, lat: f64, zoom: u8) -> TileId {
        let (x, y) = slippy_map_tilenames::lonlat2tile(lon, lat, zoom);
        TileId { zoom, x, y }
    }

    /// WGS84 bounds of the tile. `sw` is (xmin, ymin), `ne` is (xmax, ymax).
    pub fn bounds(&self) -> Mbr {
        // tile2lonlat yields the north-west corner; the next tile diagonally gives south-east
        let (west, north) = slippy_map_tilenames::tile2lonlat(self.x, self.y, self.zoom);
        let (east, south) = slippy_map_tilenames::tile2lonlat(
            self.x.saturating_add(1),
            self.y.saturating_add(1),
            self.zoom,
        );
        Mbr::new(west, south, east, north)
    }
}

impl fmt::Display for TileId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}/{}", self.zoom, self.x, self.y)
    }
}

impl FromStr for TileId {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let invalid = || Error::InvalidTile(format!("expected a z/x/y tile id, got '{}'", s));
        let mut parts = s.split('/');
        let (Some(zoom), Some(x), Some(y), None) = (parts.next(), parts.next(), parts.next(), parts.next())
        else {
            return Err(invalid());
        };
        TileId::try_new(
            zoom.parse().map_err(|_| invalid())?,
            x.parse().map_err(|_| invalid())?,
            y.parse().map_err(|_| invalid())?,
        )
    }
}
