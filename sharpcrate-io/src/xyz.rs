//! Flat whitespace-separated point formats
//!
//! Input records are `x y z nx ny nz`, one point per line, no header. Output
//! records are plain `x y z` points, oriented `x y z nx ny nz` records, and
//! label records `x y z L 0.1 0.1` where `L` is `1` or `0` and the two
//! trailing constants are placeholder color channels for viewers.

use sharpcrate_core::{Error, OrientedPoint, OrientedPointCloud, Point3d, Result, Vector3d};
use std::fs::File;
use std::io::{BufRead, BufReader, BufWriter, Write};
use std::path::Path;
use tracing::debug;

const ORIENTED_FIELDS: usize = 6;

/// Reader for `x y z nx ny nz` files
pub struct OrientedXyzReader;

impl OrientedXyzReader {
    /// Read an oriented point cloud from a file
    pub fn read_point_cloud<P: AsRef<Path>>(path: P) -> Result<OrientedPointCloud> {
        let file = File::open(path.as_ref())?;
        let cloud = Self::read_from(BufReader::new(file))?;
        debug!(path = %path.as_ref().display(), points = cloud.len(), "read oriented point cloud");
        Ok(cloud)
    }

    /// Read an oriented point cloud from any buffered source.
    ///
    /// Blank lines are skipped; any other line must start with six finite
    /// numbers.
    pub fn read_from<R: BufRead>(reader: R) -> Result<OrientedPointCloud> {
        let mut cloud = OrientedPointCloud::new();

        for (line_index, line_result) in reader.lines().enumerate() {
            let line = line_result?;
            if line.trim().is_empty() {
                continue;
            }

            let point = Self::parse_line(&line, line_index + 1)?;
            cloud.push(point);
        }

        Ok(cloud)
    }

    /// Parse a single record
    fn parse_line(line: &str, line_number: usize) -> Result<OrientedPoint> {
        let parts: Vec<&str> = line.split_whitespace().collect();

        if parts.len() < ORIENTED_FIELDS {
            return Err(Error::Parse {
                line: line_number,
                message: format!(
                    "expected {} fields (x y z nx ny nz), found {}",
                    ORIENTED_FIELDS,
                    parts.len()
                ),
            });
        }

        let mut values = [0.0f64; ORIENTED_FIELDS];
        for (slot, part) in values.iter_mut().zip(&parts) {
            let value = part.parse::<f64>().map_err(|_| Error::Parse {
                line: line_number,
                message: format!("invalid number '{}'", part),
            })?;
            if !value.is_finite() {
                return Err(Error::Parse {
                    line: line_number,
                    message: format!("non-finite value '{}'", part),
                });
            }
            *slot = value;
        }

        Ok(OrientedPoint::new(
            Point3d::new(values[0], values[1], values[2]),
            Vector3d::new(values[3], values[4], values[5]),
        ))
    }
}

/// Writers for the output record types
pub struct XyzWriter;

impl XyzWriter {
    /// Write an oriented cloud as `x y z nx ny nz`
    pub fn write_point_cloud<P: AsRef<Path>>(cloud: &OrientedPointCloud, path: P) -> Result<()> {
        Self::write_oriented(cloud.iter().map(|p| (p.position, p.normal)), path)
    }

    /// Write `(position, normal)` records as `x y z nx ny nz`
    pub fn write_oriented<I, P>(records: I, path: P) -> Result<()>
    where
        I: IntoIterator<Item = (Point3d, Vector3d)>,
        P: AsRef<Path>,
    {
        let mut writer = BufWriter::new(File::create(path)?);
        Self::write_oriented_to(&mut writer, records)?;
        writer.flush()?;
        Ok(())
    }

    pub fn write_oriented_to<W, I>(writer: &mut W, records: I) -> Result<()>
    where
        W: Write,
        I: IntoIterator<Item = (Point3d, Vector3d)>,
    {
        for (p, n) in records {
            writeln!(writer, "{} {} {} {} {} {}", p.x, p.y, p.z, n.x, n.y, n.z)?;
        }
        Ok(())
    }

    /// Write `(position, label)` records as `x y z 1|0 0.1 0.1`
    pub fn write_labels<I, P>(records: I, path: P) -> Result<()>
    where
        I: IntoIterator<Item = (Point3d, bool)>,
        P: AsRef<Path>,
    {
        let mut writer = BufWriter::new(File::create(path)?);
        Self::write_labels_to(&mut writer, records)?;
        writer.flush()?;
        Ok(())
    }

    pub fn write_labels_to<W, I>(writer: &mut W, records: I) -> Result<()>
    where
        W: Write,
        I: IntoIterator<Item = (Point3d, bool)>,
    {
        for (p, label) in records {
            writeln!(writer, "{} {} {} {} 0.1 0.1", p.x, p.y, p.z, u8::from(label))?;
        }
        Ok(())
    }

    /// Write points as `x y z`
    pub fn write_points<I, P>(points: I, path: P) -> Result<()>
    where
        I: IntoIterator<Item = Point3d>,
        P: AsRef<Path>,
    {
        let mut writer = BufWriter::new(File::create(path)?);
        Self::write_points_to(&mut writer, points)?;
        writer.flush()?;
        Ok(())
    }

    pub fn write_points_to<W, I>(writer: &mut W, points: I) -> Result<()>
    where
        W: Write,
        I: IntoIterator<Item = Point3d>,
    {
        for p in points {
            writeln!(writer, "{} {} {}", p.x, p.y, p.z)?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use std::io::Cursor;
    use std::path::PathBuf;

    fn temp_path(name: &str) -> PathBuf {
        std::env::temp_dir().join(format!("sharpcrate_{}_{}", std::process::id(), name))
    }

    #[test]
    fn test_read_oriented_records() {
        let content = "0 0 0 0 0 1\n\n  1.5 2 -3   1 0 0\n0.25 0.5 0.75 0 1 0\n";
        let cloud = OrientedXyzReader::read_from(Cursor::new(content)).unwrap();

        assert_eq!(cloud.len(), 3);
        assert_eq!(cloud[1].position, Point3d::new(1.5, 2.0, -3.0));
        assert_eq!(cloud[1].normal, Vector3d::x());
        assert_eq!(cloud[2].normal, Vector3d::y());
    }

    #[test]
    fn test_short_line_is_a_parse_error() {
        let content = "0 0 0 0 0 1\n1 2 3\n";
        match OrientedXyzReader::read_from(Cursor::new(content)) {
            Err(Error::Parse { line, .. }) => assert_eq!(line, 2),
            other => panic!("expected a parse error, got {:?}", other),
        }
    }

    #[test]
    fn test_bad_number_is_a_parse_error() {
        let content = "\n\n0 0 zero 0 0 1\n";
        match OrientedXyzReader::read_from(Cursor::new(content)) {
            Err(Error::Parse { line, message }) => {
                assert_eq!(line, 3);
                assert!(message.contains("zero"));
            }
            other => panic!("expected a parse error, got {:?}", other),
        }
    }

    #[test]
    fn test_non_finite_values_are_parse_errors() {
        for (content, bad) in [
            ("nan 0 0 0 0 1\n", "nan"),
            ("0 0 0 0 0 1\ninf 1 1 0 0 1\n", "inf"),
            ("0 0 0 0 0 1\n1 1 1 0 -infinity 1\n", "-infinity"),
            ("0 0 0 0 0 1\n1 1 1 0 0 1\n1 NaN 1 0 0 1\n", "NaN"),
        ] {
            match OrientedXyzReader::read_from(Cursor::new(content)) {
                Err(Error::Parse { line, message }) => {
                    assert_eq!(line, content.lines().count());
                    assert!(message.contains(bad), "{}", message);
                }
                other => panic!("expected a parse error for {:?}, got {:?}", content, other),
            }
        }
    }

    #[test]
    fn test_empty_input_reads_empty_cloud() {
        let cloud = OrientedXyzReader::read_from(Cursor::new("")).unwrap();
        assert!(cloud.is_empty());
    }

    #[test]
    fn test_label_records() {
        let mut buffer = Vec::new();
        XyzWriter::write_labels_to(
            &mut buffer,
            vec![(Point3d::new(0.5, 0.0, 1.0), true), (Point3d::origin(), false)],
        )
        .unwrap();
        assert_eq!(String::from_utf8(buffer).unwrap(), "0.5 0 1 1 0.1 0.1\n0 0 0 0 0.1 0.1\n");
    }

    #[test]
    fn test_write_then_read_file() {
        let path = temp_path("oriented.xyz");
        let cloud = OrientedPointCloud::from_parts(
            &[Point3d::new(0.1, 0.2, 0.3), Point3d::new(1.0, 1.0, 1.0)],
            &[Vector3d::z(), Vector3d::new(0.6, 0.8, 0.0)],
        );

        XyzWriter::write_point_cloud(&cloud, &path).unwrap();
        let read = OrientedXyzReader::read_point_cloud(&path).unwrap();

        assert_eq!(read.len(), 2);
        assert_eq!(read[0].position, cloud[0].position);
        assert_eq!(read[1].normal, cloud[1].normal);

        let _ = fs::remove_file(&path);
    }

    #[test]
    fn test_points_file() {
        let path = temp_path("points.xyz");
        XyzWriter::write_points(vec![Point3d::new(1.0, 2.0, 3.0)], &path).unwrap();
        assert_eq!(fs::read_to_string(&path).unwrap(), "1 2 3\n");
        let _ = fs::remove_file(&path);
    }

    #[test]
    fn test_missing_file_is_io_error() {
        let result = OrientedXyzReader::read_point_cloud(temp_path("does_not_exist.xyz"));
        assert!(matches!(result, Err(Error::Io(_))));
    }
}
