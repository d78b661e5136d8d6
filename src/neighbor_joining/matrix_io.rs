//! Delimited distance-matrix tables.
//!
//! Input tables may use `,`, tab, `;`, `|` or spaces, and may carry a header
//! row and/or an index column of labels. Lines starting with `#` are ignored.

use anyhow::{anyhow, bail, Context, Result};
use log::{info, warn};
use ndarray::Array2;
use serde::Serialize;
use std::{fs, path::Path, time::Instant};

const DELIMITERS: [char; 5] = [',', '\t', ';', '|', ' '];

/// How a table was read, recorded in the run log.
#[derive(Serialize, Clone, Debug, PartialEq)]
pub struct TableMeta {
    pub delimiter: char,
    pub has_header: bool,
    pub has_index: bool,
    pub symmetry_pairs_fixed: usize,
    pub load_sec: f64,
}

/// Header/index detection from the cell contents.
#[derive(Debug, Clone, Copy, PartialEq)]
struct Layout {
    has_header: bool,
    has_index: bool,
}

fn is_number(s: &str) -> bool {
    s.parse::<f64>().is_ok()
}

impl Layout {
    /// An index column is assumed when every sampled row after the first starts
    /// with a label. A header is assumed when the first row (past the index
    /// column) holds a label, or has fewer numbers than the row below it.
    fn sniff(rows: &[Vec<String>]) -> Self {
        let has_index = rows.len() > 1
            && rows
                .iter()
                .skip(1)
                .take(10)
                .all(|r| r.first().map_or(false, |c| !is_number(c)));

        let skip = usize::from(has_index);
        let numbers = |row: &Vec<String>| row.iter().skip(skip).filter(|c| is_number(c)).count();
        let first = &rows[0];
        let has_header = first.iter().skip(skip).any(|c| !is_number(c))
            || rows.get(1).map_or(false, |second| numbers(first) < numbers(second));

        Layout {
            has_header,
            has_index,
        }
    }
}

/// Candidate with the most occurrences in `line`; ties keep the earlier one.
fn detect_delim(line: &str) -> char {
    DELIMITERS
        .iter()
        .rev()
        .map(|&c| (line.matches(c).count(), c))
        .filter(|&(count, _)| count > 0)
        .max_by_key(|&(count, _)| count)
        .map_or(',', |(_, c)| c)
}

fn read_rows(text: &str, delim: char) -> Result<Vec<Vec<String>>> {
    let mut rdr = csv::ReaderBuilder::new()
        .has_headers(false)
        .flexible(true)
        .comment(Some(b'#'))
        .delimiter(delim as u8)
        .from_reader(text.as_bytes());

    let mut rows = Vec::new();
    for rec in rdr.records() {
        let row: Vec<String> = rec?
            .iter()
            .map(str::trim)
            // runs of spaces produce empty cells
            .filter(|c| delim != ' ' || !c.is_empty())
            .map(String::from)
            .collect();
        if row.iter().any(|c| !c.is_empty()) {
            rows.push(row);
        }
    }
    Ok(rows)
}

/// Average mismatched `(i,j)`/`(j,i)` pairs and zero the diagonal. Returns the
/// number of pairs that needed averaging.
fn symmetrize(mat: &mut Array2<f64>) -> usize {
    let n = mat.nrows();
    let mut fixed = 0;
    for i in 0..n {
        mat[[i, i]] = 0.0;
        for j in (i + 1)..n {
            let (a, b) = (mat[[i, j]], mat[[j, i]]);
            if (a - b).abs() > 1e-12 {
                let avg = 0.5 * (a + b);
                mat[[i, j]] = avg;
                mat[[j, i]] = avg;
                fixed += 1;
            }
        }
    }
    fixed
}

fn synthetic_labels(n: usize) -> Vec<String> {
    (1..=n).map(|i| format!("t{}", i)).collect()
}

/// Read a square distance table. Labels come from the header row, else the
/// index column, else are synthesised as `t1..tn`.
pub fn load_distance_matrix(path: &str) -> Result<(Array2<f64>, Vec<String>, TableMeta)> {
    let t_load = Instant::now();
    let text = fs::read_to_string(path).with_context(|| format!("reading '{}'", path))?;

    let first_line = text
        .lines()
        .map(str::trim)
        .find(|l| !l.is_empty() && !l.starts_with('#'))
        .ok_or_else(|| anyhow!("no data lines found"))?;
    let delim = detect_delim(first_line);
    info!("Detected delimiter: {:?}", delim);

    let rows = read_rows(&text, delim)?;
    if rows.is_empty() {
        bail!("empty table");
    }
    let layout = Layout::sniff(&rows);
    info!("Header: {}, Index column: {}", layout.has_header, layout.has_index);

    let start_row = usize::from(layout.has_header);
    let start_col = usize::from(layout.has_index);
    let body = &rows[start_row..];
    let n = body.len();

    let labels = if layout.has_header {
        // the corner cell above the index column may be missing
        let header = &rows[0];
        header[header.len().saturating_sub(n)..].to_vec()
    } else if layout.has_index {
        body.iter().map(|r| r[0].clone()).collect()
    } else {
        synthetic_labels(n)
    };

    let mut mat = Array2::<f64>::zeros((n, n));
    for (ri, row) in body.iter().enumerate() {
        let cells = row.get(start_col..).unwrap_or(&[]);
        if cells.len() != n {
            bail!(
                "parsed table is not square: rows={}, cols={} (line {})",
                n,
                cells.len(),
                ri + start_row + 1
            );
        }
        for (ci, cell) in cells.iter().enumerate() {
            mat[[ri, ci]] = cell.parse().with_context(|| {
                format!("parsing number at row {}, col {}", ri + start_row + 1, ci + start_col + 1)
            })?;
        }
    }

    let symmetry_pairs_fixed = symmetrize(&mut mat);
    if symmetry_pairs_fixed > 0 {
        warn!(
            "Distance matrix not perfectly symmetric; averaged {} off-diagonal pairs",
            symmetry_pairs_fixed
        );
    }

    let labels = if labels.len() == n {
        labels
    } else {
        warn!("Label count ({}) != n ({}). Synthesizing t1..tn labels.", labels.len(), n);
        synthetic_labels(n)
    };

    let meta = TableMeta {
        delimiter: delim,
        has_header: layout.has_header,
        has_index: layout.has_index,
        symmetry_pairs_fixed,
        load_sec: t_load.elapsed().as_secs_f64(),
    };
    Ok((mat, labels, meta))
}

/// Square CSV with a header row and an index column, both holding the labels.
pub fn write_distance_matrix<P: AsRef<Path>>(
    path: P,
    labels: &[String],
    matrix: &Array2<f64>,
) -> Result<()> {
    let mut wtr = csv::Writer::from_path(&path)
        .with_context(|| format!("failed to create CSV at {}", path.as_ref().display()))?;
    wtr.write_record(std::iter::once("").chain(labels.iter().map(String::as_str)))?;
    for (label, row) in labels.iter().zip(matrix.rows()) {
        let cells = row.iter().map(|d| d.to_string());
        wtr.write_record(std::iter::once(label.clone()).chain(cells))?;
    }
    wtr.flush()?;
    Ok(())
}

#[cfg(test)]
mod matrix_io_tests {
    use super::*;
    use crate::neighbor_joining::neighbor_joining;
    use pretty_assertions::assert_eq;
    use std::io::Write;
    use tempfile::NamedTempFile;

    /// Four taxa whose cherries tie on Q; NJ gives (A:2,B:3,(C:4,D:4):3).
    const CHERRIES: [[f64; 4]; 4] = [
        [0.0, 5.0, 9.0, 9.0],
        [5.0, 0.0, 10.0, 10.0],
        [9.0, 10.0, 0.0, 8.0],
        [9.0, 10.0, 8.0, 0.0],
    ];

    /// Render `CHERRIES` with the given delimiter and optional label row/column.
    fn render(delim: &str, header: bool, index: bool) -> String {
        let names = ["A", "B", "C", "D"];
        let mut out = String::new();
        if header {
            let mut cells: Vec<&str> = Vec::new();
            if index {
                cells.push("");
            }
            cells.extend(names);
            out.push_str(&cells.join(delim));
            out.push('\n');
        }
        for (name, row) in names.iter().zip(CHERRIES.iter()) {
            let mut cells: Vec<String> = Vec::new();
            if index {
                cells.push(name.to_string());
            }
            cells.extend(row.iter().map(|d| d.to_string()));
            out.push_str(&cells.join(delim));
            out.push('\n');
        }
        out
    }

    fn load_str(content: &str) -> Result<(Array2<f64>, Vec<String>, TableMeta)> {
        let mut tf = NamedTempFile::new().expect("tmp");
        tf.write_all(content.as_bytes()).expect("write");
        load_distance_matrix(&tf.path().to_string_lossy())
    }

    fn sorted_nj(mat: Array2<f64>, labels: &[String]) -> String {
        let mut tree = neighbor_joining(mat, labels).unwrap();
        tree.sort();
        tree.to_newick(0)
    }

    #[test]
    fn labelled_csv_feeds_nj() {
        let (mat, labels, meta) = load_str(&render(",", true, true)).unwrap();
        assert_eq!(labels, vec!["A", "B", "C", "D"]);
        assert_eq!((meta.delimiter, meta.has_header, meta.has_index), (',', true, true));
        assert_eq!(meta.symmetry_pairs_fixed, 0);
        assert_eq!(sorted_nj(mat, &labels), "(A:2,B:3,(C:4,D:4):3);");
    }

    #[test]
    fn every_layout_reads_the_same_matrix() {
        let expected = Array2::from_shape_fn((4, 4), |(i, j)| CHERRIES[i][j]);
        for delim in [",", "\t", ";", "|", " "] {
            for (header, index) in [(true, true), (true, false), (false, true), (false, false)] {
                let text = render(delim, header, index);
                let (mat, labels, meta) = load_str(&text).unwrap();
                assert_eq!(mat, expected, "{:?} header={} index={}", delim, header, index);
                assert_eq!(meta.has_header, header, "{:?}", text);
                assert_eq!(meta.has_index, index, "{:?}", text);
                if header || index {
                    assert_eq!(labels, vec!["A", "B", "C", "D"]);
                } else {
                    assert_eq!(labels, vec!["t1", "t2", "t3", "t4"]);
                }
            }
        }
    }

    #[test]
    fn comments_and_padding_are_skipped() {
        let text = format!("# cherries\n\n{}", render("  ", false, true));
        let (mat, labels, meta) = load_str(&text).unwrap();
        assert_eq!(meta.delimiter, ' ');
        assert_eq!(labels, vec!["A", "B", "C", "D"]);
        assert_eq!(mat[[2, 3]], 8.0);
    }

    #[test]
    fn asymmetric_pairs_are_averaged() {
        // C-D given as 7 and 9 in the two triangles
        let text = render(",", true, true).replace("C,9,10,0,8", "C,9,10,0,7").replace(
            "D,9,10,8,0",
            "D,9,10,9,0",
        );
        let (mat, labels, meta) = load_str(&text).unwrap();
        assert_eq!(meta.symmetry_pairs_fixed, 1);
        assert_eq!(mat[[2, 3]], 8.0);
        assert_eq!(mat[[3, 2]], 8.0);
        assert_eq!(sorted_nj(mat, &labels), "(A:2,B:3,(C:4,D:4):3);");
    }

    #[test]
    fn ragged_or_non_numeric_tables_fail() {
        let missing_column = ",A,B,C,D\nA,0,5,9\nB,5,0,10\nC,9,10,0\nD,9,10,8\n";
        let err = load_str(missing_column).unwrap_err();
        assert!(format!("{:#}", err).contains("not square"), "{:#}", err);

        let bad_cell = render(",", true, true).replace("B,5,0,10,10", "B,5,0,x,10");
        let err = load_str(&bad_cell).unwrap_err();
        assert!(format!("{:#}", err).contains("parsing number at row 3, col 4"), "{:#}", err);

        assert!(load_str("# only a comment\n").is_err());
    }

    #[test]
    fn written_tables_load_back() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("d.csv");
        let labels: Vec<String> = ["w x", "y", "z"].iter().map(|s| s.to_string()).collect();
        let mat = Array2::from_shape_fn((3, 3), |(i, j)| (i as f64 - j as f64).abs() * 1.5);
        write_distance_matrix(&path, &labels, &mat).unwrap();
        let (loaded, loaded_labels, meta) = load_distance_matrix(&path.to_string_lossy()).unwrap();
        assert!(meta.has_header && meta.has_index);
        assert_eq!(loaded_labels, labels);
        assert_eq!(loaded, mat);
    }
}
