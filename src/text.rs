//! Text normalization helpers shared by the store and the engine.

/// Lowercase and fold diacritics so attribute strings compare reliably
///
/// Marketplace attribute labels are German and inconsistently accented
/// ("Benzin", "Hybrid (Benzin/Elektro)", "Schaltgetriebe" vs
/// "schaltgetriebe"); the strict filters compare under this folding.
pub fn normalize(s: &str) -> String {
    let mut out = String::with_capacity(s.len());
    for c in s.trim().chars() {
        for lc in c.to_lowercase() {
            match lc {
                'ä' | 'à' | 'á' | 'â' | 'ã' | 'å' => out.push('a'),
                'ö' | 'ò' | 'ó' | 'ô' | 'õ' | 'ø' => out.push('o'),
                'ü' | 'ù' | 'ú' | 'û' => out.push('u'),
                'é' | 'è' | 'ê' | 'ë' => out.push('e'),
                'í' | 'ì' | 'î' | 'ï' => out.push('i'),
                'ß' => out.push_str("ss"),
                'ç' => out.push('c'),
                'ñ' => out.push('n'),
                other => out.push(other),
            }
        }
    }
    out
}

/// Equality under [`normalize`]
pub fn normalized_eq(a: &str, b: &str) -> bool {
    normalize(a) == normalize(b)
}

/// Canonicalize a listing URL to origin + path
///
/// Query string and fragment are stripped; the result is the stable
/// identity key for a listing. Anything that does not look like a URL is
/// returned with only the query/fragment cut off.
pub fn canonical_url(url: &str) -> String {
    let trimmed = url.trim();
    let without_fragment = match trimmed.find('#') {
        Some(pos) => &trimmed[..pos],
        None => trimmed,
    };
    let without_query = match without_fragment.find('?') {
        Some(pos) => &without_fragment[..pos],
        None => without_fragment,
    };
    without_query.to_string()
}

/// Extract the numeric marketplace identifier embedded in a URL or id
///
/// Returns the longest run of 6+ consecutive digits, the last such run
/// on a length tie. This is a best-effort dedup heuristic for the
/// marketplace issuing near-duplicate URLs for the same ad, not a
/// guaranteed identity function.
pub fn numeric_listing_id(s: &str) -> Option<String> {
    let mut best: Option<(usize, usize)> = None; // (start, len)
    let bytes = s.as_bytes();
    let mut i = 0;
    while i < bytes.len() {
        if bytes[i].is_ascii_digit() {
            let start = i;
            while i < bytes.len() && bytes[i].is_ascii_digit() {
                i += 1;
            }
            let len = i - start;
            if len >= 6 && best.map_or(true, |(_, blen)| len >= blen) {
                best = Some((start, len));
            }
        } else {
            i += 1;
        }
    }
    best.map(|(start, len)| s[start..start + len].to_string())
}
