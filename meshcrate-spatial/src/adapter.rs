//! Item adapters describing the spatial extent of tree items

use meshcrate_core::{Edge, Point3f, Triangle, Vector3f};

/// Supplies the axis aligned extent of an item stored in a [`KdTree`](crate::KdTree).
pub trait ItemAdapter<T> {
    fn min(&self, item: &T) -> Point3f;

    fn max(&self, item: &T) -> Point3f;

    fn center(&self, item: &T) -> Point3f {
        nalgebra::center(&self.min(item), &self.max(item))
    }

    fn size(&self, item: &T) -> Vector3f {
        self.max(item) - self.min(item)
    }
}

/// Adapter for bare points, which have no extent
#[derive(Debug, Clone, Copy, Default)]
pub struct PointAdapter;

impl ItemAdapter<Point3f> for PointAdapter {
    fn min(&self, item: &Point3f) -> Point3f {
        *item
    }

    fn max(&self, item: &Point3f) -> Point3f {
        *item
    }

    fn center(&self, item: &Point3f) -> Point3f {
        *item
    }

    fn size(&self, _item: &Point3f) -> Vector3f {
        Vector3f::zeros()
    }
}

#[derive(Debug, Clone, Copy, Default)]
pub struct TriangleAdapter;

impl ItemAdapter<Triangle> for TriangleAdapter {
    fn min(&self, item: &Triangle) -> Point3f {
        item.min()
    }

    fn max(&self, item: &Triangle) -> Point3f {
        item.max()
    }
}

#[derive(Debug, Clone, Copy, Default)]
pub struct EdgeAdapter;

impl ItemAdapter<Edge> for EdgeAdapter {
    fn min(&self, item: &Edge) -> Point3f {
        item.min()
    }

    fn max(&self, item: &Edge) -> Point3f {
        item.max()
    }
}
