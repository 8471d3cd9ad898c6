//! SpatiaLite geometry BLOB decoding.
//!
//! Layout: `0x00`, byte order flag, SRID (i32), MBR (4 x f64), `0x7C`, class type (i32),
//! class-specific body, `0xFE`. Collection members are each prefixed with `0x69` and their
//! own class type.
//!
//! Further reading: https://www.gaia-gis.it/gaia-sins/BLOB-Geometry.html

use crate::geometry::{Coord, Geometry, Polygon};

const START: u8 = 0x00;
const MBR_END: u8 = 0x7C;
const ENTITY: u8 = 0x69;
const END: u8 = 0xFE;

const BIG_ENDIAN: u8 = 0x00;
const LITTLE_ENDIAN: u8 = 0x01;

const POINT: i32 = 1;
const LINESTRING: i32 = 2;
const POLYGON: i32 = 3;
const MULTIPOINT: i32 = 4;
const MULTILINESTRING: i32 = 5;
const MULTIPOLYGON: i32 = 6;

#[derive(Debug, thiserror::Error, PartialEq)]
pub enum BlobError {
    #[error("blob ends unexpectedly at byte {0}")]
    Truncated(usize),

    #[error("expected {marker} marker at byte {offset}, found 0x{found:02x}")]
    Marker {
        marker: &'static str,
        offset: usize,
        found: u8,
    },

    #[error("invalid byte order flag 0x{0:02x}")]
    ByteOrder(u8),

    #[error("unsupported geometry class {0}")]
    UnsupportedClass(i32),

    #[error("collection of class {collection} holds an element of class {element}")]
    UnexpectedElement { collection: i32, element: i32 },

    #[error("invalid element count {0}")]
    InvalidCount(i32),

    #[error("{0} bytes left after the end marker")]
    TrailingBytes(usize),
}

/// Decoded class type code, e.g. 1003002 is a compressed LINESTRING ZM.
#[derive(Clone, Copy, Debug)]
struct Class {
    code: i32,
    base: i32,
    has_z: bool,
    has_m: bool,
    compressed: bool,
}

impl Class {
    fn parse(code: i32) -> Result<Class, BlobError> {
        let compressed = match code / 1_000_000 {
            0 => false,
            1 => true,
            _ => return Err(BlobError::UnsupportedClass(code)),
        };
        let rest = code % 1_000_000;
        let (has_z, has_m) = match rest / 1000 {
            0 => (false, false),
            1 => (true, false),
            2 => (false, true),
            3 => (true, true),
            _ => return Err(BlobError::UnsupportedClass(code)),
        };
        let base = rest % 1000;
        let supported = if compressed {
            base == LINESTRING || base == POLYGON
        } else {
            (POINT..=MULTIPOLYGON).contains(&base)
        };
        if !supported {
            return Err(BlobError::UnsupportedClass(code));
        }

        Ok(Class {
            code,
            base,
            has_z,
            has_m,
            compressed,
        })
    }

    fn point_size(&self) -> usize {
        8 * (2 + usize::from(self.has_z) + usize::from(self.has_m))
    }

    /// Smallest encoding of one vertex in a point sequence of this class.
    fn min_vertex_size(&self) -> usize {
        if self.compressed {
            4 * (2 + usize::from(self.has_z)) + 8 * usize::from(self.has_m)
        } else {
            self.point_size()
        }
    }
}

pub fn decode(blob: &[u8]) -> Result<Geometry, BlobError> {
    let mut reader = Reader {
        blob,
        offset: 0,
        little_endian: true,
    };

    reader.expect("start", START)?;
    reader.little_endian = match reader.u8()? {
        LITTLE_ENDIAN => true,
        BIG_ENDIAN => false,
        other => return Err(BlobError::ByteOrder(other)),
    };
    let _srid = reader.i32()?;
    for _ in 0..4 {
        reader.f64()?;
    }
    reader.expect("MBR end", MBR_END)?;

    let class = Class::parse(reader.i32()?)?;
    let geometry = reader.geometry(class)?;

    reader.expect("end", END)?;
    match reader.remaining() {
        0 => Ok(geometry),
        trailing => Err(BlobError::TrailingBytes(trailing)),
    }
}

struct Reader<'a> {
    blob: &'a [u8],
    offset: usize,
    little_endian: bool,
}

impl<'a> Reader<'a> {
    fn remaining(&self) -> usize {
        self.blob.len() - self.offset
    }

    fn take<const N: usize>(&mut self) -> Result<[u8; N], BlobError> {
        let end = self.offset + N;
        let bytes = self
            .blob
            .get(self.offset..end)
            .ok_or(BlobError::Truncated(self.offset))?;
        self.offset = end;

        let mut result = [0u8; N];
        result.copy_from_slice(bytes);
        Ok(result)
    }

    fn u8(&mut self) -> Result<u8, BlobError> {
        Ok(self.take::<1>()?[0])
    }

    fn i32(&mut self) -> Result<i32, BlobError> {
        let bytes = self.take()?;
        Ok(if self.little_endian {
            i32::from_le_bytes(bytes)
        } else {
            i32::from_be_bytes(bytes)
        })
    }

    fn f32(&mut self) -> Result<f32, BlobError> {
        let bytes = self.take()?;
        Ok(if self.little_endian {
            f32::from_le_bytes(bytes)
        } else {
            f32::from_be_bytes(bytes)
        })
    }

    fn f64(&mut self) -> Result<f64, BlobError> {
        let bytes = self.take()?;
        Ok(if self.little_endian {
            f64::from_le_bytes(bytes)
        } else {
            f64::from_be_bytes(bytes)
        })
    }

    fn expect(&mut self, marker: &'static str, expected: u8) -> Result<(), BlobError> {
        let offset = self.offset;
        match self.u8()? {
            found if found == expected => Ok(()),
            found => Err(BlobError::Marker {
                marker,
                offset,
                found,
            }),
        }
    }

    /// Reads an element count and checks the blob can hold that many elements.
    fn count(&mut self, min_element_size: usize) -> Result<usize, BlobError> {
        let count = self.i32()?;
        let elements = usize::try_from(count).map_err(|_| BlobError::InvalidCount(count))?;
        if elements.saturating_mul(min_element_size) > self.remaining() {
            return Err(BlobError::Truncated(self.blob.len()));
        }
        Ok(elements)
    }

    fn geometry(&mut self, class: Class) -> Result<Geometry, BlobError> {
        let geometry = match class.base {
            POINT => Geometry::Point(self.coord(class)?),
            LINESTRING => Geometry::LineString(self.points(class)?),
            POLYGON => Geometry::Polygon(self.polygon(class)?),
            MULTIPOINT => Geometry::MultiPoint(self.elements(class, POINT, Reader::coord)?),
            MULTILINESTRING => {
                Geometry::MultiLineString(self.elements(class, LINESTRING, Reader::points)?)
            }
            MULTIPOLYGON => Geometry::MultiPolygon(self.elements(class, POLYGON, Reader::polygon)?),
            _ => return Err(BlobError::UnsupportedClass(class.code)),
        };
        Ok(geometry)
    }

    fn coord(&mut self, class: Class) -> Result<Coord, BlobError> {
        let x = self.f64()?;
        let y = self.f64()?;
        let z = if class.has_z { Some(self.f64()?) } else { None };
        if class.has_m {
            self.f64()?;
        }
        Ok(Coord { x, y, z })
    }

    /// A vertex of a compressed sequence: float offsets from the previous vertex, M kept
    /// as a full double.
    fn delta(&mut self, class: Class, previous: &Coord) -> Result<Coord, BlobError> {
        let x = previous.x + f64::from(self.f32()?);
        let y = previous.y + f64::from(self.f32()?);
        let z = if class.has_z {
            Some(previous.z.unwrap_or_default() + f64::from(self.f32()?))
        } else {
            None
        };
        if class.has_m {
            self.f64()?;
        }
        Ok(Coord { x, y, z })
    }

    fn points(&mut self, class: Class) -> Result<Vec<Coord>, BlobError> {
        let count = self.count(class.min_vertex_size())?;
        let mut points: Vec<Coord> = Vec::with_capacity(count);
        for i in 0..count {
            // compressed sequences store their first and last vertex uncompressed
            let point = match points.last() {
                Some(previous) if class.compressed && i != count - 1 => self.delta(class, previous)?,
                _ => self.coord(class)?,
            };
            points.push(point);
        }
        Ok(points)
    }

    fn polygon(&mut self, class: Class) -> Result<Polygon, BlobError> {
        let rings = self.count(4)?;
        if rings == 0 {
            return Ok(Polygon {
                exterior: Vec::new(),
                interiors: Vec::new(),
            });
        }
        let exterior = self.points(class)?;
        let interiors = (1..rings)
            .map(|_| self.points(class))
            .collect::<Result<Vec<_>, _>>()?;
        Ok(Polygon {
            exterior,
            interiors,
        })
    }

    fn elements<T>(
        &mut self,
        collection: Class,
        element_base: i32,
        mut read: impl FnMut(&mut Self, Class) -> Result<T, BlobError>,
    ) -> Result<Vec<T>, BlobError> {
        let count = self.count(5)?;
        let mut elements = Vec::with_capacity(count);
        for _ in 0..count {
            self.expect("entity", ENTITY)?;
            let class = Class::parse(self.i32()?)?;
            if class.base != element_base {
                return Err(BlobError::UnexpectedElement {
                    collection: collection.code,
                    element: class.code,
                });
            }
            elements.push(read(self, class)?);
        }
        Ok(elements)
    }
}
