//! District boundaries and the coordinate systems they are published in

pub mod crs;
pub mod districts;
#[cfg(test)]
pub(crate) mod shapefile_fixture;
pub mod wkt;

pub use crs::{Crs, Reprojector};
pub use districts::{
    parse_geojson_districts, parse_shapefile_districts, District, DistrictMatch, DistrictSet,
};
