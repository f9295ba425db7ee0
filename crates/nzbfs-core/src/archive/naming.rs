//! Archive part filename normalization and first-part selection. Pure
//! string logic, no I/O.

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ArchiveKind {
    Rar,
    SevenZip,
}

fn last_component(name: &str) -> &str {
    name.rsplit('/').next().unwrap_or(name)
}

fn has_extension(name: &str) -> bool {
    last_component(name).contains('.')
}

fn strip_all_extensions(name: &str) -> &str {
    let base = last_component(name);
    base.split('.').next().unwrap_or(base)
}

/// Renames a list of archive part files into the convention the archive
/// library expects, leaving already-conventional names untouched.
///
/// Renaming only happens when *none* of the files carry an extension; a
/// mix of extension-bearing and bare names is left as-is (the source NZB
/// is assumed internally consistent).
pub fn normalize_part_names(names: &[String], kind: ArchiveKind) -> Vec<String> {
    let all_bare = names.iter().all(|n| !has_extension(n));
    if !all_bare {
        return names.to_vec();
    }

    match kind {
        ArchiveKind::Rar => names
            .iter()
            .enumerate()
            .map(|(i, n)| format!("{}.r{:02}", strip_all_extensions(n), i))
            .collect(),
        ArchiveKind::SevenZip => names
            .iter()
            .enumerate()
            .map(|(i, n)| format!("{}.{:03}", strip_all_extensions(n), i + 1))
            .collect(),
    }
}

fn is_part_nnn_rar(lower: &str) -> bool {
    if !lower.ends_with(".rar") {
        return false;
    }
    let without_rar = &lower[..lower.len() - 4];
    match without_rar.rfind(".part") {
        Some(idx) => {
            let digits = &without_rar[idx + 5..];
            !digits.is_empty() && digits.chars().all(|c| c.is_ascii_digit())
        }
        None => false,
    }
}

fn is_bare_rar(lower: &str) -> bool {
    lower.ends_with(".rar") && !is_part_nnn_rar(lower)
}

fn is_rnn(lower: &str) -> bool {
    match lower.rfind(".r") {
        Some(idx) => {
            let rest = &lower[idx + 2..];
            !rest.is_empty() && rest.chars().all(|c| c.is_ascii_digit())
        }
        None => false,
    }
}

fn is_numeric_part(lower: &str) -> bool {
    match lower.rfind('.') {
        Some(idx) => {
            let rest = &lower[idx + 1..];
            !rest.is_empty() && rest.chars().all(|c| c.is_ascii_digit())
        }
        None => false,
    }
}

fn is_bare_7z(lower: &str) -> bool {
    lower.ends_with(".7z")
}

fn is_7z_part(lower: &str) -> bool {
    match lower.rfind(".7z.") {
        Some(idx) => {
            let rest = &lower[idx + 4..];
            !rest.is_empty() && rest.chars().all(|c| c.is_ascii_digit())
        }
        None => false,
    }
}

/// Lower number = higher priority. `None` if the name doesn't match any
/// recognized pattern for `kind`.
fn priority(name: &str, kind: ArchiveKind) -> Option<u8> {
    let lower = last_component(name).to_ascii_lowercase();
    match kind {
        ArchiveKind::Rar => {
            if is_bare_rar(&lower) {
                Some(0)
            } else if is_part_nnn_rar(&lower) {
                Some(1)
            } else if is_rnn(&lower) {
                Some(2)
            } else if is_numeric_part(&lower) {
                Some(3)
            } else {
                None
            }
        }
        ArchiveKind::SevenZip => {
            if is_bare_7z(&lower) {
                Some(0)
            } else if is_7z_part(&lower) {
                Some(1)
            } else {
                None
            }
        }
    }
}

/// Selects the file the archive library should be asked to open first,
/// by ascending priority order.
pub fn select_first_part<'a>(names: &'a [String], kind: ArchiveKind) -> Option<&'a str> {
    names
        .iter()
        .filter_map(|n| priority(n, kind).map(|p| (p, n.as_str())))
        .min_by_key(|(p, _)| *p)
        .map(|(_, n)| n)
}
