/// Chunk partitioning
///
/// Splits a workload into `n` chunks so that `n` worker slots can each take
/// chunk `i`. [`select_chunk`] sorts first, so every worker sees the same
/// partition regardless of the order its listing came back in.
///
/// Two formulas are in use:
/// - [`chunk_bounds`] (used by [`select_chunk`]) balances sizes: the first
///   `L % n` chunks hold one extra item.
/// - [`shell_chunk_bounds`] (used by the shell snippets and [`lines_chunk`])
///   gives chunks `0..n-1` exactly `max(1, L / n)` items and lets the last
///   chunk absorb the remainder.
use std::ops::Range;

use crate::error::{GalaxyError, Result};
use crate::template::script::{indent, shell_quote};

fn check_range(n: usize, i: usize) -> Result<()> {
    if n == 0 || i >= n {
        return Err(GalaxyError::Range { index: i, count: n });
    }
    Ok(())
}

/// Balanced bounds of chunk `i` of `n` over `len` items
pub fn chunk_bounds(len: usize, n: usize, i: usize) -> Result<Range<usize>> {
    check_range(n, i)?;
    let (k, m) = (len / n, len % n);
    let start = i * k + i.min(m);
    let end = (i + 1) * k + (i + 1).min(m);
    Ok(start..end)
}

/// Bounds of chunk `i` of `n` with the remainder in the last chunk
pub fn shell_chunk_bounds(len: usize, n: usize, i: usize) -> Result<Range<usize>> {
    check_range(n, i)?;
    let size = (len / n).max(1);
    let start = (i * size).min(len);
    let end = if i == n - 1 { len } else { ((i + 1) * size).min(len) };
    Ok(start..end.max(start))
}

/// Sort `items` and return chunk `i` of `n`
pub fn select_chunk<T: Ord + Clone>(items: &[T], n: usize, i: usize) -> Result<Vec<T>> {
    let range = chunk_bounds(items.len(), n, i)?;
    let mut sorted = items.to_vec();
    sorted.sort();
    Ok(sorted[range].to_vec())
}

/// Chunk `i` of `n` over the non-blank lines of `text`, in input order
pub fn lines_chunk(text: &str, n: usize, i: usize) -> Result<Vec<&str>> {
    let lines: Vec<&str> = text.lines().filter(|l| !l.trim().is_empty()).collect();
    let range = shell_chunk_bounds(lines.len(), n, i)?;
    Ok(lines[range].to_vec())
}

fn check_identifier(name: &str) -> Result<()> {
    let mut chars = name.chars();
    let valid = chars
        .next()
        .map(|c| c.is_ascii_alphabetic() || c == '_')
        .unwrap_or(false)
        && chars.all(|c| c.is_ascii_alphanumeric() || c == '_');
    if !valid {
        return Err(GalaxyError::Template(format!(
            "'{}' is not a valid shell variable name",
            name
        )));
    }
    Ok(())
}

/// Bash snippet writing chunk `i` of `n` of the non-blank lines of `in_file` to `out_file`
pub fn bash_select_chunk(in_file: &str, n: usize, i: usize, out_file: &str) -> Result<String> {
    check_range(n, i)?;
    Ok(format!(
        r#"# galaxy: select chunk {i} of {n} from {in_file}
awk -v n={n} -v i={i} 'NF > 0 {{ lines[c++] = $0 }}
END {{
  size = int(c / n); if (size < 1) size = 1
  start = i * size
  stop = (i == n - 1) ? c : (i + 1) * size
  if (stop > c) stop = c
  for (k = start; k < stop; k++) print lines[k]
}}' {src} > {dst}"#,
        i = i,
        n = n,
        in_file = in_file,
        src = shell_quote(in_file),
        dst = shell_quote(out_file),
    ))
}

/// Bash snippet running `script` for each entry of chunk `i` of `n` of
/// `ls <opt> <pattern>`, with `$<it_var>` set to the entry
///
/// The pattern is left unquoted so the shell expands it.
pub fn bash_iter_ls_slice(
    pattern: &str,
    n: usize,
    i: usize,
    opt: &str,
    it_var: &str,
    script: &str,
) -> Result<String> {
    check_range(n, i)?;
    check_identifier(it_var)?;

    let listing = if opt.is_empty() {
        format!("LC_ALL=C ls {} 2>/dev/null", pattern)
    } else {
        format!("LC_ALL=C ls {} {} 2>/dev/null", opt, pattern)
    };

    Ok(format!(
        r#"# galaxy: iterate chunk {i} of {n} of `ls {opt} {pattern}`
__galaxy_items=()
while IFS= read -r __galaxy_item; do
  __galaxy_items+=("$__galaxy_item")
done < <({listing})
__galaxy_total=${{#__galaxy_items[@]}}
__galaxy_size=$(( __galaxy_total / {n} ))
if [ "$__galaxy_size" -lt 1 ]; then __galaxy_size=1; fi
__galaxy_start=$(( {i} * __galaxy_size ))
if [ {i} -eq {last} ]; then
  __galaxy_stop=$__galaxy_total
else
  __galaxy_stop=$(( {next} * __galaxy_size ))
fi
if [ "$__galaxy_stop" -gt "$__galaxy_total" ]; then __galaxy_stop=$__galaxy_total; fi
for (( __galaxy_k = __galaxy_start; __galaxy_k < __galaxy_stop; __galaxy_k++ )); do
  {it_var}="${{__galaxy_items[$__galaxy_k]}}"
{body}
done"#,
        i = i,
        n = n,
        last = n - 1,
        next = i + 1,
        opt = opt,
        pattern = pattern,
        listing = listing,
        it_var = it_var,
        body = indent(script, 2),
    ))
}

/// Bash snippet running `script` for each line of `in_file` with `$<it_var>` set
pub fn bash_iter_file_lines(in_file: &str, it_var: &str, script: &str) -> Result<String> {
    check_identifier(it_var)?;
    Ok(format!(
        r#"while IFS= read -r {it_var} || [ -n "${it_var}" ]; do
{body}
done < {src}"#,
        it_var = it_var,
        body = indent(script, 2),
        src = shell_quote(in_file),
    ))
}
