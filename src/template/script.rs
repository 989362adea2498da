//! Shell code generation helpers shared by the template builder, the chunk
//! snippets and the checkpoint wrapper.

/// Delimiter for quoted heredocs carrying runtime-injected values
pub const VALUE_HEREDOC: &str = "__GALAXY_EOF__";

/// Delimiter for the heredoc carrying the encoded handler payload
pub const PAYLOAD_HEREDOC: &str = "__GALAXY_PAYLOAD__";

/// Environment variable naming the runner binary inside the second stage
pub const RUNNER_ENV: &str = "GALAXY_RUNNER";

/// Quote a string for POSIX shells using single quotes
pub fn shell_quote(s: &str) -> String {
    if !s.is_empty()
        && s
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || "-_./=:@%+,".contains(c))
    {
        return s.to_string();
    }
    format!("'{}'", s.replace('\'', r"'\''"))
}

/// JSON string literal, quotes included
pub fn json_string(s: &str) -> String {
    serde_json::Value::String(s.to_string()).to_string()
}

/// Placeholder substituted by the scheduler with the value of an input parameter
pub fn input_placeholder(name: &str) -> String {
    format!("{{{{inputs.parameters.{}}}}}", name)
}

/// Placeholder referencing an output parameter of another step
pub fn step_output_placeholder(step: &str, name: &str) -> String {
    format!("{{{{steps.{}.outputs.parameters.{}}}}}", step, name)
}

/// Join POSIX path segments onto a base directory
pub fn join_remote(base: &str, parts: &[&str]) -> String {
    let mut path = base.trim_end_matches('/').to_string();
    if path.is_empty() && base.starts_with('/') {
        path.push('/');
    }
    for part in parts {
        if !path.is_empty() && !path.ends_with('/') {
            path.push('/');
        }
        path.push_str(part.trim_matches('/'));
    }
    path
}

/// Parent directory of a POSIX path, `.` for bare names
pub fn remote_parent(path: &str) -> &str {
    match path.trim_end_matches('/').rfind('/') {
        Some(0) => "/",
        Some(idx) => &path[..idx],
        None => ".",
    }
}

/// Indent every non-empty line of a snippet
pub fn indent(snippet: &str, width: usize) -> String {
    let pad = " ".repeat(width);
    snippet
        .lines()
        .map(|line| {
            if line.trim().is_empty() {
                String::new()
            } else {
                format!("{}{}", pad, line)
            }
        })
        .collect::<Vec<_>>()
        .join("\n")
}

/// Bash function printing its argument JSON-escaped (without surrounding quotes)
///
/// Works byte-wise under `LC_ALL=C`, so UTF-8 sequences pass through intact
/// and every control character is escaped.
pub const JSON_ESCAPE_FN: &str = r#"__galaxy_json_str() {
  local LC_ALL=C
  local s=$1 out='' c i
  for (( i = 0; i < ${#s}; i++ )); do
    c=${s:i:1}
    case $c in
      '"') out+='\"' ;;
      '\') out+='\\' ;;
      $'\n') out+='\n' ;;
      $'\r') out+='\r' ;;
      $'\t') out+='\t' ;;
      [[:cntrl:]]) printf -v c '\\u%04x' "'$c"; out+=$c ;;
      *) out+=$c ;;
    esac
  done
  printf '%s' "$out"
}"#;
