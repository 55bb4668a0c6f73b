use anyhow::Result;
use geo::{BoundingRect, Relate};
use rstar::AABB;

use crate::types::ContiguityMode;

use super::PlanarUnits;

impl PlanarUnits {
    /// Compute contiguity neighbor lists for every unit.
    ///
    /// Queen: the two boundaries share at least one point. For a planar
    /// partition any intersection between distinct units is a boundary
    /// contact, so the plain intersects predicate also absorbs slightly
    /// overlapping (marginally invalid) inputs instead of dropping the pair.
    ///
    /// Rook additionally requires the boundary/boundary DE-9IM entry to have
    /// dimension 1 (a shared segment, not just a corner).
    ///
    /// The result is symmetric by construction and sorted per row, so the
    /// same input order always yields the identical adjacency.
    pub fn contiguity(&self, mode: ContiguityMode) -> Result<Vec<Vec<u32>>> {
        let mut adj: Vec<Vec<u32>> = vec![Vec::new(); self.len()];

        // bbox padding if you expect FP jitter; keep 0.0 if not needed
        let eps = 0.0_f64;

        for i in 0..self.len() {
            let Some(rect) = self.geoms()[i].bounding_rect() else { continue };
            let search = AABB::from_corners(
                [rect.min().x - eps, rect.min().y - eps],
                [rect.max().x + eps, rect.max().y + eps],
            );

            for j in self.query(&search) {
                if j <= i { continue; } // check each unordered pair once

                let im = self.geoms()[i].relate(&self.geoms()[j]);

                let touching = match mode {
                    ContiguityMode::Queen => im.is_intersects(),
                    // In the 9-char DE-9IM string, index 4 is Boundary/Boundary.
                    ContiguityMode::Rook => im.is_intersects() && im.matches("****1****")?,
                };

                if touching {
                    adj[i].push(j as u32);
                    adj[j].push(i as u32);
                }
            }
        }

        for nbrs in &mut adj {
            nbrs.sort_unstable();
        }

        Ok(adj)
    }
}
