//! Stored geometries as handed over by the store, before scaling.
//!
//! Every geometry is a closed set of variants that can be walked as an ordered sequence of
//! point runs ([`Geometry::parts`]): one run per point, line, or polygon exterior ring.

use crate::tile::Mbr;

use serde::Serialize;

#[derive(Clone, Copy, Debug, PartialEq, Serialize)]
pub struct Coord {
    pub x: f64,
    pub y: f64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub z: Option<f64>,
}

impl Coord {
    pub fn xy(x: f64, y: f64) -> Coord {
        Coord { x, y, z: None }
    }

    pub fn xyz(x: f64, y: f64, z: f64) -> Coord {
        Coord { x, y, z: Some(z) }
    }
}

#[derive(Clone, Debug, PartialEq)]
pub struct Polygon {
    pub exterior: Vec<Coord>,
    /// Holes. Decoded but never emitted to a feature.
    pub interiors: Vec<Vec<Coord>>,
}

#[derive(Clone, Debug, PartialEq)]
pub enum Geometry {
    Point(Coord),
    LineString(Vec<Coord>),
    Polygon(Polygon),
    MultiPoint(Vec<Coord>),
    MultiLineString(Vec<Vec<Coord>>),
    MultiPolygon(Vec<Polygon>),
}

impl Geometry {
    pub fn kind(&self) -> &'static str {
        match self {
            Geometry::Point(_) => "POINT",
            Geometry::LineString(_) => "LINESTRING",
            Geometry::Polygon(_) => "POLYGON",
            Geometry::MultiPoint(_) => "MULTIPOINT",
            Geometry::MultiLineString(_) => "MULTILINESTRING",
            Geometry::MultiPolygon(_) => "MULTIPOLYGON",
        }
    }

    /// Point runs in storage order. Polygons contribute their exterior ring only.
    pub fn parts(&self) -> Parts<'_> {
        let parts: Vec<&[Coord]> = match self {
            Geometry::Point(point) => vec![std::slice::from_ref(point)],
            Geometry::LineString(line) => vec![line.as_slice()],
            Geometry::Polygon(polygon) => vec![polygon.exterior.as_slice()],
            Geometry::MultiPoint(points) => points.iter().map(std::slice::from_ref).collect(),
            Geometry::MultiLineString(lines) => lines.iter().map(Vec::as_slice).collect(),
            Geometry::MultiPolygon(polygons) => polygons
                .iter()
                .map(|polygon| polygon.exterior.as_slice())
                .collect(),
        };
        Parts {
            inner: parts.into_iter(),
        }
    }

    /// Bounding rectangle of every emitted point, or `None` for an empty geometry.
    pub fn bounding_box(&self) -> Option<Mbr> {
        self.parts().flatten().fold(None, |mbr, point| {
            Some(match mbr {
                None => Mbr::new(point.x, point.y, point.x, point.y),
                Some(mbr) => Mbr::new(
                    mbr.xmin.min(point.x),
                    mbr.ymin.min(point.y),
                    mbr.xmax.max(point.x),
                    mbr.ymax.max(point.y),
                ),
            })
        })
    }
}

/// Iterator over the point runs of a [`Geometry`].
pub struct Parts<'a> {
    inner: std::vec::IntoIter<&'a [Coord]>,
}

impl<'a> Iterator for Parts<'a> {
    type Item = &'a [Coord];

    fn next(&mut self) -> Option<Self::Item> {
        self.inner.next()
    }

    fn size_hint(&self) -> (usize, Option<usize>) {
        self.inner.size_hint()
    }
}

impl ExactSizeIterator for Parts<'_> {}
