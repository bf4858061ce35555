use crate::domain::{FluxError, FluxResult, RedshiftOrder};
use crate::modules::fitter::DerivativeTable;
use std::fs;
use std::path::Path;
use tracing::info;

/// Render a value like C's `%1.3g`: three significant digits, trailing zeros
/// removed, exponent form outside `1e-4 <= |x| < 1e3`.
pub fn format_significant(value: f64) -> String {
    if value == 0.0 {
        return "0".to_string();
    }
    if !value.is_finite() {
        return value.to_string().to_lowercase();
    }

    let scientific = format!("{value:.2e}");
    let Some((mantissa, exponent)) = scientific.split_once('e') else {
        return scientific;
    };
    let exponent: i32 = exponent.parse().unwrap_or_default();
    if !(-4..3).contains(&exponent) {
        let sign = if exponent < 0 { '-' } else { '+' };
        return format!("{}e{sign}{:02}", trim_fraction(mantissa), exponent.abs());
    }
    let decimals = usize::try_from(2 - exponent).unwrap_or_default();
    trim_fraction(&format!("{value:.decimals$}"))
}

fn trim_fraction(text: &str) -> String {
    if text.contains('.') {
        text.trim_end_matches('0').trim_end_matches('.').to_string()
    } else {
        text.to_string()
    }
}

/// Flat text form of `table`: one row per slot bin (`a` block, `b` block,
/// then `c`, `d`), one column per redshift in `order`.
pub fn render_flat_table(table: &DerivativeTable, order: RedshiftOrder) -> FluxResult<String> {
    let matrix = table.sorted(order).to_matrix()?;
    let mut rendered = String::new();
    for row in 0..matrix.nrows() {
        let line = (0..matrix.ncols())
            .map(|col| format_significant(matrix[(row, col)]))
            .collect::<Vec<_>>()
            .join(" ");
        rendered.push_str(&line);
        rendered.push('\n');
    }
    Ok(rendered)
}

pub fn save_flat_table(path: &Path, table: &DerivativeTable, order: RedshiftOrder) -> FluxResult<()> {
    let rendered = render_flat_table(table, order)?;
    fs::write(path, rendered).map_err(|source| {
        FluxError::io(
            "IO.TABLE_WRITE",
            format!("failed to write '{}': {source}", path.display()),
        )
    })?;
    info!(path = %path.display(), redshifts = table.len(), "wrote flat derivative table");
    Ok(())
}
