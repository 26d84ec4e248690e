//! Pure rendering and parsing of hosts content

/// First line of the managed block
pub const START_MARKER: &str = "# == PT-Accelerator START ==";

/// Last line of the managed block
pub const END_MARKER: &str = "# == PT-Accelerator END ==";

const TRACKER_SECTION: &str = "PT站点加速";
const SOURCE_SECTION: &str = "MergedHosts";

/// Domains never taken from a hosts source
const DOMAIN_BLACKLIST: &[&str] = &[
    "docker.com",
    "docker.io",
    "quay.io",
    "gcr.io",
    "k8s.gcr.io",
    "ghcr.io",
];

/// Whether `domain` contains a blacklisted registry domain
pub fn is_blacklisted(domain: &str) -> bool {
    DOMAIN_BLACKLIST.iter().any(|bad| domain.contains(bad))
}

/// `(ip, domain)` pairs of a hosts file
///
/// Comments, blank lines, lines with fewer than two fields and blacklisted
/// domains are skipped. Only the first name of a line is used.
pub fn parse_hosts_text(text: &str) -> Vec<(String, String)> {
    text.lines()
        .map(str::trim)
        .filter(|line| !line.is_empty() && !line.starts_with('#'))
        .filter_map(|line| {
            let mut fields = line.split_whitespace();
            let ip = fields.next()?;
            let domain = fields.next()?;
            (!is_blacklisted(domain)).then(|| (ip.to_string(), domain.to_string()))
        })
        .collect()
}

fn push_section(block: &mut String, title: &str, entries: &[String]) {
    if entries.is_empty() {
        return;
    }
    block.push_str(&format!("# ===== {}开始 ===== #\n", title));
    for entry in entries {
        block.push_str(entry);
        block.push('\n');
    }
    block.push_str(&format!("# ===== {}结束 ({} 条记录) ===== #\n", title, entries.len()));
}

/// The managed block for tracker and merged source entries
///
/// Entries are `ip<TAB>domain` lines.
pub fn render_block(tracker_entries: &[String], source_entries: &[String]) -> String {
    let mut block = format!("{}\n", START_MARKER);
    push_section(&mut block, TRACKER_SECTION, tracker_entries);
    push_section(&mut block, SOURCE_SECTION, source_entries);
    block.push_str(END_MARKER);
    block.push('\n');
    block
}

/// `content` with every managed block removed
///
/// A start marker without a later end marker is left alone.
pub fn strip_managed_blocks(content: &str) -> String {
    let mut content = content.to_string();
    while let Some(start) = content.find(START_MARKER) {
        let Some(offset) = content[start..].find(END_MARKER) else {
            tracing::warn!("Unterminated managed block left in hosts file");
            break;
        };
        let end = start + offset + END_MARKER.len();
        content.replace_range(start..end, "");
    }
    content
}
