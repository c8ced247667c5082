use std::path::Path;

const DISC_KEYWORDS: &[&str] = &["disc", "disk", "cd", "volume", "vol", "part"];

/// Disk number from a sub-folder such as `CD2` or `Disc II` between `root`
/// and `file`.
pub(crate) fn disk_from_path(file: &Path, root: &Path) -> Option<u64> {
    let folders = file.parent()?.strip_prefix(root).ok()?;
    folders
        .components()
        .rev()
        .find_map(|component| parse_disc_folder(&component.as_os_str().to_string_lossy()))
}

fn parse_disc_folder(name: &str) -> Option<u64> {
    let cleaned: String = name
        .chars()
        .map(|ch| match ch {
            '_' | '-' | '.' => ' ',
            other => other.to_ascii_lowercase(),
        })
        .collect();
    let cleaned = cleaned.trim();
    let keyword = DISC_KEYWORDS
        .iter()
        .find(|keyword| cleaned.starts_with(**keyword))?;
    let token = cleaned[keyword.len()..].split_whitespace().next()?;
    number_token(token)
}

fn number_token(token: &str) -> Option<u64> {
    if token.chars().all(|c| c.is_ascii_digit()) {
        return token.parse().ok();
    }
    roman_value(token)
}

fn roman_value(token: &str) -> Option<u64> {
    let mut total = 0u64;
    let mut prev = 0u64;
    for ch in token.chars().rev() {
        let value = match ch {
            'i' => 1,
            'v' => 5,
            'x' => 10,
            'l' => 50,
            'c' => 100,
            _ => return None,
        };
        if value < prev {
            total = total.checked_sub(value)?;
        } else {
            total += value;
            prev = value;
        }
    }
    (total > 0).then_some(total)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::path::PathBuf;

    #[test]
    fn parses_common_disc_folder_names() {
        assert_eq!(parse_disc_folder("CD2"), Some(2));
        assert_eq!(parse_disc_folder("Disc 1"), Some(1));
        assert_eq!(parse_disc_folder("disk_03"), Some(3));
        assert_eq!(parse_disc_folder("Vol. IV"), Some(4));
        assert_eq!(parse_disc_folder("Disc 2 of 3"), Some(2));
        assert_eq!(parse_disc_folder("Scans"), None);
        assert_eq!(parse_disc_folder("Discography"), None);
        assert_eq!(parse_disc_folder("CD"), None);
    }

    #[test]
    fn uses_nearest_disc_folder_below_root() {
        let root = PathBuf::from("/music/Opera");
        assert_eq!(
            disk_from_path(&root.join("CD 3").join("01.flac"), &root),
            Some(3)
        );
        assert_eq!(disk_from_path(&root.join("01.flac"), &root), None);
        assert_eq!(
            disk_from_path(Path::new("/music/Disc 9/01.flac"), &root),
            None
        );
    }
}
