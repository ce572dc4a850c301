//! Hierarchical point clustering over zoom levels.
//!
//! Points are projected into unit Web Mercator space and indexed once per
//! zoom level. Starting from the deepest level, every point that has not yet
//! been absorbed grabs its unabsorbed neighbours within
//! `radius / (extent * 2^zoom)` and, when enough of them are found, the group
//! is replaced by a synthetic cluster at its weighted centroid. Each level is
//! an R*-tree over the nodes that survived from the level below.
//!
//! ## Cluster ids
//!
//! A cluster id packs the position of its seed node and the zoom the seed
//! lives at: `(seed_index << 5) + seed_zoom + point_count`. Ids are therefore
//! never smaller than the number of indexed points, which keeps them disjoint
//! from leaf indices and lets `children`, `leaves` and `expansion_zoom` walk
//! back down the hierarchy without a lookup table.

use super::{ClusterSummary, IndexHit, IndexedPoint};
use crate::compute::spatial::{degree_extents, haversine_km, lng_spans};
use crate::config::ClusterConfig;
use crate::error::{GeoIndexError, Result};
use flora_types::bbox::BoundingBox;
use flora_types::point::GeoPoint;
use flora_types::record::PointKind;
use rstar::primitives::GeomWithData;
use rstar::{AABB, RTree};
use std::f64::consts::PI;

type Entry = GeomWithData<[f64; 2], usize>;

const UNVISITED: u8 = u8::MAX;

/// Cluster ids pack the origin zoom into five bits.
const MAX_ZOOM: u8 = 30;

/// Parameters of one cluster index.
#[derive(Debug, Clone, PartialEq)]
pub struct ClusterOptions {
    pub min_zoom: u8,
    pub max_zoom: u8,
    /// Cluster radius in pixels
    pub radius: f64,
    /// Tile extent the radius is measured against
    pub extent: u32,
    pub min_points: usize,
}

impl ClusterOptions {
    pub fn for_kind(config: &ClusterConfig, kind: PointKind) -> Self {
        Self {
            min_zoom: config.min_zoom,
            max_zoom: config.max_zoom.min(MAX_ZOOM),
            radius: config.radius_for(kind),
            extent: config.extent.max(1),
            min_points: config.min_points.max(1),
        }
    }

    fn radius_at(&self, zoom: u8) -> f64 {
        self.radius / (self.extent as f64 * 2f64.powi(zoom as i32))
    }
}

impl Default for ClusterOptions {
    fn default() -> Self {
        Self::for_kind(&ClusterConfig::default(), PointKind::Predictions)
    }
}

#[derive(Debug, Clone)]
struct Node {
    x: f64,
    y: f64,
    /// Last zoom this node was processed at
    zoom: u8,
    num_points: usize,
    attribute_sum: f64,
    /// Leaf index, or packed cluster id
    id: usize,
    parent_id: Option<usize>,
    cluster: bool,
}

impl Node {
    fn leaf(index: usize, point: &IndexedPoint) -> Self {
        Self {
            x: lng_x(point.point.lng),
            y: lat_y(point.point.lat),
            zoom: UNVISITED,
            num_points: 1,
            attribute_sum: point.attribute.unwrap_or(0.0),
            id: index,
            parent_id: None,
            cluster: false,
        }
    }

    fn cluster(x: f64, y: f64, id: usize, num_points: usize, attribute_sum: f64) -> Self {
        Self {
            x,
            y,
            zoom: UNVISITED,
            num_points,
            attribute_sum,
            id,
            parent_id: None,
            cluster: true,
        }
    }
}

#[derive(Debug)]
struct Level {
    nodes: Vec<Node>,
    tree: RTree<Entry>,
}

impl Level {
    fn new(nodes: Vec<Node>) -> Self {
        let entries = nodes
            .iter()
            .enumerate()
            .map(|(i, n)| Entry::new([n.x, n.y], i))
            .collect();
        Self {
            nodes,
            tree: RTree::bulk_load(entries),
        }
    }

    fn within(&self, x: f64, y: f64, r: f64) -> Vec<usize> {
        let mut ids: Vec<usize> = self
            .tree
            .locate_within_distance([x, y], r * r)
            .map(|e| e.data)
            .collect();
        ids.sort_unstable();
        ids
    }

    fn range(&self, min_x: f64, min_y: f64, max_x: f64, max_y: f64) -> Vec<usize> {
        let envelope = AABB::from_corners([min_x, min_y], [max_x, max_y]);
        let mut ids: Vec<usize> = self
            .tree
            .locate_in_envelope(&envelope)
            .map(|e| e.data)
            .collect();
        ids.sort_unstable();
        ids
    }
}

/// Zoom-aware cluster index over the points of one date key.
#[derive(Debug)]
pub struct ClusterIndex {
    options: ClusterOptions,
    points: Vec<IndexedPoint>,
    /// One level per zoom in `min_zoom..=max_zoom + 1`, `None` below
    levels: Vec<Option<Level>>,
}

impl ClusterIndex {
    pub fn build(points: Vec<IndexedPoint>, mut options: ClusterOptions) -> Self {
        options.max_zoom = options.max_zoom.min(MAX_ZOOM);
        options.min_zoom = options.min_zoom.min(options.max_zoom);
        let top = options.max_zoom as usize + 1;
        let n = points.len();
        let mut levels: Vec<Option<Level>> = (0..=top).map(|_| None).collect();

        let leaves = points
            .iter()
            .enumerate()
            .map(|(i, p)| Node::leaf(i, p))
            .collect();
        levels[top] = Some(Level::new(leaves));

        for zoom in (options.min_zoom..=options.max_zoom).rev() {
            let next = match levels[zoom as usize + 1].as_mut() {
                Some(level) => cluster_level(level, zoom, n, &options),
                None => Vec::new(),
            };
            levels[zoom as usize] = Some(Level::new(next));
        }

        Self {
            options,
            points,
            levels,
        }
    }

    pub fn options(&self) -> &ClusterOptions {
        &self.options
    }

    pub fn len(&self) -> usize {
        self.points.len()
    }

    pub fn is_empty(&self) -> bool {
        self.points.is_empty()
    }

    pub fn points(&self) -> &[IndexedPoint] {
        &self.points
    }

    fn limit_zoom(&self, zoom: u8) -> u8 {
        zoom.min(self.options.max_zoom.saturating_add(1))
            .max(self.options.min_zoom)
    }

    fn level(&self, zoom: u8) -> Option<&Level> {
        self.levels.get(zoom as usize).and_then(Option::as_ref)
    }

    fn hit(&self, node: &Node) -> IndexHit<'_> {
        if node.cluster {
            IndexHit::Cluster(ClusterSummary {
                id: node.id,
                center: GeoPoint::new(y_lat(node.y), x_lng(node.x)),
                point_count: node.num_points,
                attribute_sum: node.attribute_sum,
            })
        } else {
            IndexHit::Point(&self.points[node.id])
        }
    }

    /// Visit the nodes visible inside `bbox` at `zoom`.
    ///
    /// Longitudes outside `[-180, 180]` wrap; a box crossing the antimeridian
    /// is split in two.
    fn visit_bbox<'a>(&'a self, bbox: &BoundingBox, zoom: u8, visit: &mut dyn FnMut(&'a Node)) {
        let min_lat = bbox.min_lat.clamp(-90.0, 90.0);
        let max_lat = bbox.max_lat.clamp(-90.0, 90.0);
        let Some(level) = self.level(self.limit_zoom(zoom)) else {
            return;
        };
        for (min_lng, max_lng) in lng_spans(bbox.min_lng, bbox.max_lng) {
            for i in level.range(lng_x(min_lng), lat_y(max_lat), lng_x(max_lng), lat_y(min_lat)) {
                visit(&level.nodes[i]);
            }
        }
    }

    /// Points and clusters visible inside `bbox` at `zoom`.
    pub fn clusters(&self, bbox: &BoundingBox, zoom: u8) -> Vec<IndexHit<'_>> {
        let mut hits = Vec::new();
        self.visit_bbox(bbox, zoom, &mut |node| hits.push(self.hit(node)));
        hits
    }

    /// Points and clusters at `zoom` whose position lies within
    /// `radius_km` of `center`.
    pub fn around(&self, center: &GeoPoint, radius_km: f64, zoom: u8) -> Vec<IndexHit<'_>> {
        let mut hits = Vec::new();
        self.visit_around(center, radius_km, zoom, &mut |node| hits.push(self.hit(node)));
        hits
    }

    fn visit_around<'a>(
        &'a self,
        center: &GeoPoint,
        radius_km: f64,
        zoom: u8,
        visit: &mut dyn FnMut(&'a Node),
    ) {
        let (d_lat, d_lng) = degree_extents(center, radius_km);
        let envelope = BoundingBox::new(
            center.lng - d_lng,
            center.lat - d_lat,
            center.lng + d_lng,
            center.lat + d_lat,
        );
        self.visit_bbox(&envelope, zoom, &mut |node| {
            let position = GeoPoint::new(y_lat(node.y), x_lng(node.x));
            if haversine_km(center, &position) <= radius_km {
                visit(node);
            }
        });
    }

    /// `(point_count, attribute_sum)` of everything visible in `bbox` at
    /// `zoom`, without materializing features.
    pub fn aggregate_bbox(&self, bbox: &BoundingBox, zoom: u8) -> (usize, f64) {
        let mut totals = (0usize, 0.0f64);
        self.visit_bbox(bbox, zoom, &mut |node| {
            totals.0 += node.num_points;
            totals.1 += node.attribute_sum;
        });
        totals
    }

    /// Radius counterpart of [`ClusterIndex::aggregate_bbox`].
    pub fn aggregate_around(&self, center: &GeoPoint, radius_km: f64, zoom: u8) -> (usize, f64) {
        let mut totals = (0usize, 0.0f64);
        self.visit_around(center, radius_km, zoom, &mut |node| {
            totals.0 += node.num_points;
            totals.1 += node.attribute_sum;
        });
        totals
    }

    fn origin(&self, cluster_id: usize) -> Option<(usize, u8)> {
        let n = self.points.len();
        if cluster_id < n {
            return None;
        }
        let packed = cluster_id - n;
        Some((packed >> 5, (packed % 32) as u8))
    }

    fn child_nodes(&self, cluster_id: usize) -> Result<Vec<&Node>> {
        let missing =
            || GeoIndexError::InvalidInput(format!("No cluster with the specified id [{}]", cluster_id));

        let (origin_index, origin_zoom) = self.origin(cluster_id).ok_or_else(missing)?;
        let level = self.level(origin_zoom).ok_or_else(missing)?;
        let origin = level.nodes.get(origin_index).ok_or_else(missing)?;
        let r = self.options.radius_at(origin_zoom.saturating_sub(1));

        let children: Vec<&Node> = level
            .within(origin.x, origin.y, r)
            .into_iter()
            .map(|i| &level.nodes[i])
            .filter(|node| node.parent_id == Some(cluster_id))
            .collect();

        if children.is_empty() {
            return Err(missing());
        }
        Ok(children)
    }

    /// The points and clusters a cluster splits into one zoom level deeper.
    pub fn children(&self, cluster_id: usize) -> Result<Vec<IndexHit<'_>>> {
        Ok(self
            .child_nodes(cluster_id)?
            .into_iter()
            .map(|node| self.hit(node))
            .collect())
    }

    /// Original points under a cluster, paginated.
    pub fn leaves(&self, cluster_id: usize, limit: usize, offset: usize) -> Result<Vec<&IndexedPoint>> {
        let mut leaves = Vec::new();
        let mut skipped = 0;
        self.append_leaves(&mut leaves, cluster_id, limit, offset, &mut skipped)?;
        Ok(leaves)
    }

    fn append_leaves<'a>(
        &'a self,
        result: &mut Vec<&'a IndexedPoint>,
        cluster_id: usize,
        limit: usize,
        offset: usize,
        skipped: &mut usize,
    ) -> Result<()> {
        for child in self.child_nodes(cluster_id)? {
            if result.len() >= limit {
                break;
            }
            if child.cluster {
                if *skipped + child.num_points <= offset {
                    *skipped += child.num_points;
                } else {
                    self.append_leaves(result, child.id, limit, offset, skipped)?;
                }
            } else if *skipped < offset {
                *skipped += 1;
            } else {
                result.push(&self.points[child.id]);
            }
        }
        Ok(())
    }

    /// Zoom at which a cluster first splits into more than one child.
    pub fn expansion_zoom(&self, cluster_id: usize) -> Result<u8> {
        let (_, origin_zoom) = self
            .origin(cluster_id)
            .ok_or_else(|| GeoIndexError::InvalidInput(format!("Not a cluster id [{}]", cluster_id)))?;
        let mut zoom = origin_zoom.saturating_sub(1);
        let mut id = cluster_id;
        while zoom <= self.options.max_zoom {
            let children = self.child_nodes(id)?;
            zoom += 1;
            match children.as_slice() {
                [only] if only.cluster => id = only.id,
                _ => break,
            }
        }
        Ok(zoom)
    }
}

fn cluster_level(level: &mut Level, zoom: u8, n: usize, options: &ClusterOptions) -> Vec<Node> {
    let r = options.radius_at(zoom);
    let mut next = Vec::new();

    for i in 0..level.nodes.len() {
        if level.nodes[i].zoom <= zoom {
            continue;
        }
        level.nodes[i].zoom = zoom;

        let (px, py) = (level.nodes[i].x, level.nodes[i].y);
        let neighbors = level.within(px, py, r);

        let origin_points = level.nodes[i].num_points;
        let num_points = origin_points
            + neighbors
                .iter()
                .filter(|&&j| level.nodes[j].zoom > zoom)
                .map(|&j| level.nodes[j].num_points)
                .sum::<usize>();

        if num_points > origin_points && num_points >= options.min_points {
            let mut wx = px * origin_points as f64;
            let mut wy = py * origin_points as f64;
            let mut attribute_sum = level.nodes[i].attribute_sum;
            let id = (i << 5) + (zoom as usize + 1) + n;

            for &j in &neighbors {
                let b = &mut level.nodes[j];
                if b.zoom <= zoom {
                    continue;
                }
                b.zoom = zoom;
                wx += b.x * b.num_points as f64;
                wy += b.y * b.num_points as f64;
                attribute_sum += b.attribute_sum;
                b.parent_id = Some(id);
            }

            level.nodes[i].parent_id = Some(id);
            next.push(Node::cluster(
                wx / num_points as f64,
                wy / num_points as f64,
                id,
                num_points,
                attribute_sum,
            ));
        } else {
            next.push(level.nodes[i].clone());

            if num_points > 1 {
                for &j in &neighbors {
                    let b = &mut level.nodes[j];
                    if b.zoom <= zoom {
                        continue;
                    }
                    b.zoom = zoom;
                    next.push(b.clone());
                }
            }
        }
    }

    next
}

fn lng_x(lng: f64) -> f64 {
    lng / 360.0 + 0.5
}

fn lat_y(lat: f64) -> f64 {
    let sin = lat.to_radians().sin();
    let y = 0.5 - 0.25 * ((1.0 + sin) / (1.0 - sin)).ln() / PI;
    y.clamp(0.0, 1.0)
}

fn x_lng(x: f64) -> f64 {
    (x - 0.5) * 360.0
}

fn y_lat(y: f64) -> f64 {
    let y2 = (180.0 - y * 360.0).to_radians();
    360.0 * y2.exp().atan() / PI - 90.0
}
