//! `/proc/<pid>/status` field readers (Linux only).

/// Read a `kB` field such as `RssAnon:` from `/proc/{pid}/status`, in
/// bytes.
///
/// Returns `None` if the process doesn't exist, `/proc` is unavailable,
/// or the field is missing or malformed.
pub fn status_kib_field(pid: u32, field: &str) -> Option<u64> {
    let status = std::fs::read_to_string(format!("/proc/{pid}/status")).ok()?;
    parse_kib_field(&status, field)
}

/// Anonymous resident memory of `pid`: the pages nobody else can share.
pub fn private_bytes(pid: u32) -> Option<u64> {
    status_kib_field(pid, "RssAnon:")
}

fn parse_kib_field(status: &str, field: &str) -> Option<u64> {
    let value = status.lines().find_map(|line| line.strip_prefix(field))?;
    let kib: u64 = value.trim().trim_end_matches("kB").trim().parse().ok()?;
    kib.checked_mul(1024)
}
