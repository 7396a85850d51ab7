//! Compressed sparse row matrices for the random-walk value model.

/// CSR matrix over `f64`.
#[derive(Debug, Clone, PartialEq)]
pub struct SparseMatrix {
    rows: usize,
    cols: usize,
    /// `indptr[r]..indptr[r + 1]` spans row `r` in `indices`/`values`.
    indptr: Vec<usize>,
    indices: Vec<u32>,
    values: Vec<f64>,
}

impl SparseMatrix {
    /// Build from `(row, col, value)` entries. Duplicate coordinates are
    /// summed; explicit zeros are kept.
    pub fn from_entries(rows: usize, cols: usize, mut entries: Vec<(u32, u32, f64)>) -> Self {
        entries.sort_unstable_by_key(|&(r, c, _)| (r, c));

        let mut indptr = vec![0usize; rows + 1];
        let mut indices: Vec<u32> = Vec::with_capacity(entries.len());
        let mut values: Vec<f64> = Vec::with_capacity(entries.len());
        let mut last: Option<(u32, u32)> = None;

        for (r, c, v) in entries {
            debug_assert!((r as usize) < rows && (c as usize) < cols);
            if last == Some((r, c)) {
                if let Some(acc) = values.last_mut() {
                    *acc += v;
                }
                continue;
            }
            last = Some((r, c));
            indptr[r as usize + 1] += 1;
            indices.push(c);
            values.push(v);
        }

        for r in 0..rows {
            indptr[r + 1] += indptr[r];
        }

        Self {
            rows,
            cols,
            indptr,
            indices,
            values,
        }
    }

    pub fn rows(&self) -> usize {
        self.rows
    }

    pub fn cols(&self) -> usize {
        self.cols
    }

    /// Number of stored entries.
    pub fn nnz(&self) -> usize {
        self.values.len()
    }

    /// `(col, value)` pairs of one row, in ascending column order.
    pub fn row(&self, r: usize) -> impl Iterator<Item = (u32, f64)> + '_ {
        let span = self.indptr[r]..self.indptr[r + 1];
        self.indices[span.clone()]
            .iter()
            .copied()
            .zip(self.values[span].iter().copied())
    }

    pub fn get(&self, r: usize, c: usize) -> f64 {
        if r >= self.rows {
            return 0.0;
        }
        let span = self.indptr[r]..self.indptr[r + 1];
        match self.indices[span.clone()].binary_search(&(c as u32)) {
            Ok(pos) => self.values[span.start + pos],
            Err(_) => 0.0,
        }
    }

    pub fn row_sums(&self) -> Vec<f64> {
        (0..self.rows).map(|r| self.row(r).map(|(_, v)| v).sum()).collect()
    }

    pub fn transpose(&self) -> Self {
        let mut entries = Vec::with_capacity(self.nnz());
        for r in 0..self.rows {
            entries.extend(self.row(r).map(|(c, v)| (c, r as u32, v)));
        }
        Self::from_entries(self.cols, self.rows, entries)
    }

    /// `self · diag(scale)`.
    pub fn scale_columns(mut self, scale: &[f64]) -> Self {
        debug_assert_eq!(scale.len(), self.cols);
        for (c, v) in self.indices.iter().zip(self.values.iter_mut()) {
            *v *= scale[*c as usize];
        }
        self
    }

    /// Matrix-vector product `self · x`.
    pub fn mul_vec(&self, x: &[f64]) -> Vec<f64> {
        debug_assert_eq!(x.len(), self.cols);
        (0..self.rows)
            .map(|r| self.row(r).map(|(c, v)| v * x[c as usize]).sum())
            .collect()
    }
}
