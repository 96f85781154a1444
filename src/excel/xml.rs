//! Small quick-xml helpers shared by the package, style and sheet patchers.

use quick_xml::events::BytesStart;

pub(crate) type XmlResult<T> = Result<T, quick_xml::Error>;

/// Element or attribute name without its namespace prefix.
pub(crate) fn local_name(name: &[u8]) -> &[u8] {
    match name.iter().rposition(|b| *b == b':') {
        Some(idx) => &name[idx + 1..],
        None => name,
    }
}

/// Unescaped value of the attribute whose local name is `key`.
pub(crate) fn attr(e: &BytesStart<'_>, key: &[u8]) -> Option<String> {
    e.attributes()
        .with_checks(false)
        .flatten()
        .find(|a| local_name(a.key.as_ref()) == key)
        .and_then(|a| a.decode_and_unescape_value(e.decoder()).ok().map(|v| v.into_owned()))
}

/// All attributes as `(qualified name, unescaped value)` pairs, in order.
pub(crate) fn attrs(e: &BytesStart<'_>) -> XmlResult<Vec<(String, String)>> {
    let mut out = Vec::new();
    for a in e.attributes().with_checks(false) {
        let a = a?;
        let key = String::from_utf8_lossy(a.key.as_ref()).into_owned();
        out.push((key, a.decode_and_unescape_value(e.decoder())?.into_owned()));
    }
    Ok(out)
}

/// Build an element from `(name, value)` pairs; values are escaped on write.
pub(crate) fn element(name: &str, attrs: &[(String, String)]) -> BytesStart<'static> {
    let mut e = BytesStart::new(name.to_string());
    for (k, v) in attrs {
        e.push_attribute((k.as_str(), v.as_str()));
    }
    e
}

/// Copy of `e` with the `set` attributes replaced or appended and the
/// attributes named in `drop` removed.
pub(crate) fn rewrite(
    e: &BytesStart<'_>,
    set: &[(&str, &str)],
    drop: &[&str],
) -> XmlResult<BytesStart<'static>> {
    let name = String::from_utf8_lossy(e.name().as_ref()).into_owned();
    let mut pairs = attrs(e)?;
    pairs.retain(|(k, _)| !drop.contains(&k.as_str()));
    for (key, value) in set {
        set_pair(&mut pairs, key, value);
    }
    Ok(element(&name, &pairs))
}

/// Set or replace one attribute in a pair list.
pub(crate) fn set_pair(pairs: &mut Vec<(String, String)>, key: &str, value: &str) {
    match pairs.iter_mut().find(|(k, _)| k == key) {
        Some(pair) => pair.1 = value.to_string(),
        None => pairs.push((key.to_string(), value.to_string())),
    }
}
