//! Text helpers applied at write time.
//!
//! Post bodies arrive as rich markup from the console's editor. Before they
//! are stored they are reduced to a fixed set of structural tags; every
//! renderer downstream trusts the stored body and embeds it unescaped.
//!
//! The scanner walks the input once. Text is copied through, allowed tags
//! are rebuilt from scratch with only a handful of attributes, and any other
//! tag is dropped. `script` and `style` elements are
//! removed together with their content.

/// Tags that survive sanitizing.
pub const ALLOWED_TAGS: &[&str] = &[
    "p",
    "br",
    "b",
    "strong",
    "i",
    "em",
    "u",
    "h2",
    "h3",
    "h4",
    "ul",
    "ol",
    "li",
    "a",
    "img",
    "blockquote",
    "figure",
    "figcaption",
];

const VOID_TAGS: &[&str] = &["br", "img"];
const DROP_WITH_CONTENT: &[&str] = &["script", "style"];
const ALLOWED_SCHEMES: &[&str] = &["http", "https", "mailto"];

/// Truncate to at most `max` characters (not bytes).
pub fn truncate_chars(text: &str, max: usize) -> String {
    text.chars().take(max).collect()
}

/// Strip every tag, leaving only text. `&nbsp;` counts as a space.
pub fn text_content(html: &str) -> String {
    let mut result = String::with_capacity(html.len());
    let mut in_tag = false;
    for c in html.chars() {
        match c {
            '<' => in_tag = true,
            '>' => in_tag = false,
            _ if !in_tag => result.push(c),
            _ => {}
        }
    }
    result.replace("&nbsp;", " ")
}

/// Reduce `html` to [`ALLOWED_TAGS`].
pub fn sanitize_body(html: &str) -> String {
    let lower = html.to_ascii_lowercase();
    let mut out = String::with_capacity(html.len());
    let mut pos = 0;

    while let Some(rel) = html[pos..].find('<') {
        let open = pos + rel;
        out.push_str(&html[pos..open]);

        if lower[open..].starts_with("<!--") {
            pos = match lower[open..].find("-->") {
                Some(end) => open + end + 3,
                None => html.len(),
            };
            continue;
        }

        let Some(close_rel) = html[open..].find('>') else {
            // Unterminated tag: keep the rest as text.
            out.push_str("&lt;");
            pos = open + 1;
            continue;
        };
        let close = open + close_rel;
        let inner = &html[open + 1..close];
        pos = close + 1;

        let closing = inner.starts_with('/');
        let name = tag_name(inner.trim_start_matches('/'));

        if !closing && DROP_WITH_CONTENT.contains(&name.as_str()) {
            let end_token = format!("</{name}");
            pos = match lower[pos..].find(&end_token) {
                Some(end) => {
                    let after = pos + end;
                    match html[after..].find('>') {
                        Some(gt) => after + gt + 1,
                        None => html.len(),
                    }
                }
                None => html.len(),
            };
            continue;
        }

        if !ALLOWED_TAGS.contains(&name.as_str()) {
            continue;
        }

        if closing {
            if !VOID_TAGS.contains(&name.as_str()) {
                out.push_str(&format!("</{name}>"));
            }
        } else {
            out.push('<');
            out.push_str(&name);
            for (attr, value) in parse_attributes(&inner[name.len()..]) {
                if attribute_allowed(&name, &attr) && value_allowed(&attr, &value) {
                    out.push_str(&format!(" {attr}=\"{}\"", escape_attribute(&value)));
                }
            }
            out.push('>');
        }
    }
    out.push_str(&html[pos..]);
    out
}

fn tag_name(inner: &str) -> String {
    inner
        .chars()
        .take_while(|c| c.is_ascii_alphanumeric())
        .collect::<String>()
        .to_ascii_lowercase()
}

fn attribute_allowed(tag: &str, attr: &str) -> bool {
    matches!(
        (tag, attr),
        (_, "title") | ("a", "href") | ("img", "src") | ("img", "alt")
    )
}

/// Links and image sources must be relative or use one of
/// [`ALLOWED_SCHEMES`]. The check runs on the value as a browser would read
/// it, after character references are decoded.
fn value_allowed(attr: &str, value: &str) -> bool {
    if attr != "href" && attr != "src" {
        return true;
    }
    let compact: String = decode_references(value)
        .chars()
        .filter(|c| !c.is_whitespace() && !c.is_control())
        .collect::<String>()
        .to_ascii_lowercase();
    let head = match compact.find(['/', '?', '#']) {
        Some(end) => &compact[..end],
        None => compact.as_str(),
    };
    if head.contains('&') {
        return false;
    }
    match head.split_once(':') {
        Some((scheme, _)) => ALLOWED_SCHEMES.contains(&scheme),
        None => true,
    }
}

/// Decode numeric character references and the named ones that can spell
/// out a scheme. Anything else is left as written.
fn decode_references(value: &str) -> String {
    let chars: Vec<char> = value.chars().collect();
    let mut out = String::with_capacity(value.len());
    let mut i = 0;

    while i < chars.len() {
        if chars[i] != '&' {
            out.push(chars[i]);
            i += 1;
            continue;
        }
        let mut j = i + 1;
        let decoded = if chars.get(j) == Some(&'#') {
            j += 1;
            let radix = if matches!(chars.get(j), Some('x' | 'X')) {
                j += 1;
                16
            } else {
                10
            };
            let start = j;
            while j < chars.len() && chars[j].is_digit(radix) {
                j += 1;
            }
            let digits: String = chars[start..j].iter().collect();
            u32::from_str_radix(&digits, radix)
                .ok()
                .and_then(char::from_u32)
        } else {
            let start = j;
            while j < chars.len() && chars[j].is_ascii_alphanumeric() {
                j += 1;
            }
            let name: String = chars[start..j].iter().collect::<String>().to_ascii_lowercase();
            named_reference(&name)
        };
        match decoded {
            Some(c) => {
                out.push(c);
                if chars.get(j) == Some(&';') {
                    j += 1;
                }
                i = j;
            }
            None => {
                out.push('&');
                i += 1;
            }
        }
    }
    out
}

fn named_reference(name: &str) -> Option<char> {
    match name {
        "colon" => Some(':'),
        "tab" => Some('\t'),
        "newline" => Some('\n'),
        "amp" => Some('&'),
        "sol" => Some('/'),
        "quest" => Some('?'),
        "num" => Some('#'),
        "period" => Some('.'),
        "lpar" => Some('('),
        "rpar" => Some(')'),
        _ => None,
    }
}

fn escape_attribute(value: &str) -> String {
    value
        .replace('"', "&quot;")
        .replace('<', "&lt;")
        .replace('>', "&gt;")
}

/// Parse `name="v" name='v' name=v name` sequences. Names are lowercased.
fn parse_attributes(raw: &str) -> Vec<(String, String)> {
    let chars: Vec<char> = raw.trim_end_matches('/').chars().collect();
    let mut attrs = Vec::new();
    let mut i = 0;

    while i < chars.len() {
        while i < chars.len() && (chars[i].is_whitespace() || chars[i] == '/') {
            i += 1;
        }
        let start = i;
        while i < chars.len() && !chars[i].is_whitespace() && chars[i] != '=' {
            i += 1;
        }
        if start == i {
            i += 1;
            continue;
        }
        let name: String = chars[start..i].iter().collect::<String>().to_ascii_lowercase();

        while i < chars.len() && chars[i].is_whitespace() {
            i += 1;
        }
        let mut value = String::new();
        if i < chars.len() && chars[i] == '=' {
            i += 1;
            while i < chars.len() && chars[i].is_whitespace() {
                i += 1;
            }
            if i < chars.len() && (chars[i] == '"' || chars[i] == '\'') {
                let quote = chars[i];
                i += 1;
                let vstart = i;
                while i < chars.len() && chars[i] != quote {
                    i += 1;
                }
                value = chars[vstart..i].iter().collect();
                i += 1;
            } else {
                let vstart = i;
                while i < chars.len() && !chars[i].is_whitespace() {
                    i += 1;
                }
                value = chars[vstart..i].iter().collect();
            }
        }
        attrs.push((name, value));
    }
    attrs
}
