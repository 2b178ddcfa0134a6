//! Builds minimal polygon shapefiles in memory for tests

pub(crate) const NY_LONG_ISLAND_PRJ: &str = concat!(
    r#"PROJCS["NAD_1983_StatePlane_New_York_Long_Island_FIPS_3104_Feet","#,
    r#"GEOGCS["GCS_North_American_1983",DATUM["D_North_American_1983","#,
    r#"SPHEROID["GRS_1980",6378137.0,298.257222101]],PRIMEM["Greenwich",0.0],"#,
    r#"UNIT["Degree",0.0174532925199433]],PROJECTION["Lambert_Conformal_Conic"],"#,
    r#"PARAMETER["False_Easting",984250.0],PARAMETER["False_Northing",0.0],"#,
    r#"PARAMETER["Central_Meridian",-74.0],PARAMETER["Standard_Parallel_1",40.66666666666666],"#,
    r#"PARAMETER["Standard_Parallel_2",41.03333333333333],"#,
    r#"PARAMETER["Latitude_Of_Origin",40.16666666666666],UNIT["Foot_US",0.3048006096012192]]"#,
);

const POLYGON: i32 = 5;
/// Shape type, box, part count, point count, one part index and five points
const SQUARE_CONTENT_BYTES: i32 = 4 + 32 + 4 + 4 + 4 + 5 * 16;

/// `.shp` bytes holding one square polygon per `(x0, y0, size)`
pub(crate) fn polygon_shp(squares: &[(f64, f64, f64)]) -> Vec<u8> {
    let file_bytes = 100 + squares.len() as i32 * (8 + SQUARE_CONTENT_BYTES);
    let (mut xmin, mut ymin, mut xmax, mut ymax) = (f64::MAX, f64::MAX, f64::MIN, f64::MIN);
    for &(x0, y0, size) in squares {
        xmin = xmin.min(x0);
        ymin = ymin.min(y0);
        xmax = xmax.max(x0 + size);
        ymax = ymax.max(y0 + size);
    }

    let mut out = Vec::new();
    out.extend(9994i32.to_be_bytes());
    out.extend([0u8; 20]);
    out.extend((file_bytes / 2).to_be_bytes());
    out.extend(1000i32.to_le_bytes());
    out.extend(POLYGON.to_le_bytes());
    for value in [xmin, ymin, xmax, ymax, 0.0, 0.0, 0.0, 0.0] {
        out.extend(value.to_le_bytes());
    }

    for (index, &(x0, y0, size)) in squares.iter().enumerate() {
        out.extend((index as i32 + 1).to_be_bytes());
        out.extend((SQUARE_CONTENT_BYTES / 2).to_be_bytes());
        out.extend(POLYGON.to_le_bytes());
        for value in [x0, y0, x0 + size, y0 + size] {
            out.extend(value.to_le_bytes());
        }
        out.extend(1i32.to_le_bytes());
        out.extend(5i32.to_le_bytes());
        out.extend(0i32.to_le_bytes());
        // Outer rings run clockwise
        let ring = [
            (x0, y0),
            (x0, y0 + size),
            (x0 + size, y0 + size),
            (x0 + size, y0),
            (x0, y0),
        ];
        for (x, y) in ring {
            out.extend(x.to_le_bytes());
            out.extend(y.to_le_bytes());
        }
    }
    out
}

/// `.dbf` bytes with a single numeric column holding one code per record
pub(crate) fn boro_cd_dbf(field: &str, codes: &[i32]) -> Vec<u8> {
    const WIDTH: u8 = 10;
    let header_len: u16 = 32 + 32 + 1;
    let record_len: u16 = 1 + u16::from(WIDTH);

    let mut out = vec![0x03, 124, 1, 1];
    out.extend((codes.len() as u32).to_le_bytes());
    out.extend(header_len.to_le_bytes());
    out.extend(record_len.to_le_bytes());
    out.extend([0u8; 20]);

    let mut name = [0u8; 11];
    name[..field.len()].copy_from_slice(field.as_bytes());
    out.extend(name);
    out.push(b'N');
    out.extend([0u8; 4]);
    out.push(WIDTH);
    out.push(0);
    out.extend([0u8; 14]);
    out.push(0x0D);

    for code in codes {
        out.push(b' ');
        out.extend(format!("{:>10}", code).into_bytes());
    }
    out.push(0x1A);
    out
}
