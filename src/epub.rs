use std::collections::HashMap;
use std::fs::File;
use std::io::Read as _;
use std::path::{Path, PathBuf};

use anyhow::Context as _;
use quick_xml::events::{BytesStart, Event};
use quick_xml::reader::Reader;

use crate::content::TextSource;
use crate::formats::NavigationNode;
use crate::nav::NavigationSource;
use crate::spine::SpineIndex;

const CONTAINER_PATH: &str = "META-INF/container.xml";
const NCX_MEDIA_TYPE: &str = "application/x-dtbncx+xml";
const KEY_BASE: &str = "http://archive.invalid/";

#[derive(Debug, Clone)]
struct ManifestItem {
    /// Canonical archive key.
    href: String,
    media_type: String,
    properties: String,
}

#[derive(Debug, Clone, Default)]
struct Package {
    title: Option<String>,
    manifest: HashMap<String, ManifestItem>,
    spine_idrefs: Vec<String>,
    toc_id: Option<String>,
}

/// A read-only EPUB container.
pub struct EpubArchive {
    path: PathBuf,
    archive: zip::ZipArchive<File>,
    /// Canonical key -> raw zip entry name.
    entries: HashMap<String, String>,
    package_key: String,
    package: Package,
}

impl std::fmt::Debug for EpubArchive {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("EpubArchive")
            .field("path", &self.path)
            .field("package", &self.package_key)
            .field("entries", &self.entries.len())
            .finish()
    }
}

impl EpubArchive {
    pub fn open(path: &Path) -> anyhow::Result<Self> {
        let file = File::open(path).with_context(|| format!("open epub: {}", path.display()))?;
        let archive = zip::ZipArchive::new(file)
            .with_context(|| format!("read epub zip: {}", path.display()))?;

        let entries = archive
            .file_names()
            .filter_map(|name| Some((canonical_key("", name)?, name.to_owned())))
            .collect::<HashMap<_, _>>();

        let mut epub = Self {
            path: path.to_path_buf(),
            archive,
            entries,
            package_key: String::new(),
            package: Package::default(),
        };

        let container = epub
            .read_entry(CONTAINER_PATH)
            .context("read container.xml")?;
        let rootfile = parse_container(&container).context("parse container.xml")?;
        let package_key = canonical_key("", &rootfile)
            .ok_or_else(|| anyhow::anyhow!("invalid rootfile path: {rootfile}"))?;
        let opf = epub
            .read_entry(&package_key)
            .with_context(|| format!("read package document: {package_key}"))?;
        epub.package = parse_package(&opf, &package_key)
            .with_context(|| format!("parse package document: {package_key}"))?;
        epub.package_key = package_key;

        tracing::debug!(
            path = %path.display(),
            package = %epub.package_key,
            manifest_items = epub.package.manifest.len(),
            spine_items = epub.package.spine_idrefs.len(),
            "opened epub"
        );
        Ok(epub)
    }

    pub fn title(&self) -> Option<&str> {
        self.package.title.as_deref()
    }

    pub fn spine_index(&self) -> SpineIndex {
        let mut items = Vec::with_capacity(self.package.spine_idrefs.len());
        for idref in &self.package.spine_idrefs {
            let Some(item) = self.package.manifest.get(idref) else {
                tracing::warn!(idref = %idref, "spine item references unknown manifest id; skipping");
                continue;
            };
            items.push((idref.clone(), item.href.clone()));
        }
        SpineIndex::new(items)
    }

    /// Modern navigation document first, then the legacy NCX.
    pub fn navigation_source(&mut self) -> NavigationSource {
        if let Some(key) = self.nav_document_key() {
            match self.parse_nav_document(&key) {
                Ok(nodes) if !nodes.is_empty() => return NavigationSource::Modern(nodes),
                Ok(_) => {
                    tracing::debug!(nav = %key, "navigation document has no toc entries");
                }
                Err(err) => {
                    let error = format!("{err:#}");
                    tracing::warn!(nav = %key, error = %error, "failed to read navigation document");
                }
            }
        }

        if let Some(key) = self.ncx_key() {
            match self.parse_ncx_document(&key) {
                Ok(nodes) if !nodes.is_empty() => return NavigationSource::Legacy(nodes),
                Ok(_) => {
                    tracing::debug!(ncx = %key, "ncx has no navigation points");
                }
                Err(err) => {
                    let error = format!("{err:#}");
                    tracing::warn!(ncx = %key, error = %error, "failed to read ncx");
                }
            }
        }

        NavigationSource::Missing
    }

    fn nav_document_key(&self) -> Option<String> {
        let mut items = self
            .package
            .manifest
            .values()
            .filter(|item| item.properties.split_whitespace().any(|p| p == "nav"))
            .map(|item| item.href.clone())
            .collect::<Vec<_>>();
        items.sort();
        items.into_iter().next()
    }

    fn ncx_key(&self) -> Option<String> {
        if let Some(id) = self.package.toc_id.as_deref()
            && let Some(item) = self.package.manifest.get(id)
        {
            return Some(item.href.clone());
        }
        let mut items = self
            .package
            .manifest
            .values()
            .filter(|item| item.media_type == NCX_MEDIA_TYPE)
            .map(|item| item.href.clone())
            .collect::<Vec<_>>();
        items.sort();
        items.into_iter().next()
    }

    fn parse_nav_document(&mut self, key: &str) -> anyhow::Result<Vec<NavigationNode>> {
        let raw = self.read_entry(key)?;
        parse_nav_toc(&raw, key)
    }

    fn parse_ncx_document(&mut self, key: &str) -> anyhow::Result<Vec<NavigationNode>> {
        let raw = self.read_entry(key)?;
        parse_ncx(&raw, key)
    }

    fn read_entry(&mut self, key: &str) -> anyhow::Result<String> {
        let name = self
            .entries
            .get(key)
            .cloned()
            .ok_or_else(|| anyhow::anyhow!("missing archive entry: {key}"))?;
        let mut entry = self
            .archive
            .by_name(&name)
            .with_context(|| format!("open archive entry: {name}"))?;
        let mut bytes = Vec::new();
        entry
            .read_to_end(&mut bytes)
            .with_context(|| format!("read archive entry: {name}"))?;
        Ok(String::from_utf8_lossy(&bytes).into_owned())
    }
}

impl TextSource for EpubArchive {
    fn extract_text(&mut self, content_reference: &str) -> anyhow::Result<String> {
        let markup = self.read_entry(content_reference)?;
        Ok(markup_to_text(&markup))
    }
}

/// Resolves `href` against the directory of the document at `base_key` and
/// returns a canonical archive key. Fragments are kept.
pub fn canonical_key(base_key: &str, href: &str) -> Option<String> {
    let root = url::Url::parse(KEY_BASE).ok()?;
    let base = root.join(base_key).ok()?;
    let joined = base.join(href.trim()).ok()?;
    if joined.scheme() != root.scheme() || joined.host_str() != root.host_str() {
        return None;
    }
    let path = joined.path().trim_start_matches('/');
    let decoded = percent_decode(path);
    match joined.fragment() {
        Some(fragment) if !fragment.is_empty() => {
            Some(format!("{decoded}#{}", percent_decode(fragment)))
        }
        _ => Some(decoded),
    }
}

fn percent_decode(input: &str) -> String {
    let bytes = input.as_bytes();
    let mut out = Vec::with_capacity(bytes.len());
    let mut i = 0;
    while i < bytes.len() {
        if bytes[i] == b'%'
            && i + 2 < bytes.len()
            && let (Some(hi), Some(lo)) = (hex_value(bytes[i + 1]), hex_value(bytes[i + 2]))
        {
            out.push(hi * 16 + lo);
            i += 3;
            continue;
        }
        out.push(bytes[i]);
        i += 1;
    }
    String::from_utf8_lossy(&out).into_owned()
}

fn hex_value(b: u8) -> Option<u8> {
    match b {
        b'0'..=b'9' => Some(b - b'0'),
        b'a'..=b'f' => Some(b - b'a' + 10),
        b'A'..=b'F' => Some(b - b'A' + 10),
        _ => None,
    }
}

fn xml_reader(raw: &str) -> Reader<&[u8]> {
    let mut reader = Reader::from_str(raw);
    let config = reader.config_mut();
    config.trim_text(true);
    config.check_end_names = false;
    reader
}

fn local_name(e: &BytesStart<'_>) -> String {
    String::from_utf8_lossy(e.local_name().as_ref()).to_ascii_lowercase()
}

fn attribute(e: &BytesStart<'_>, name: &str) -> Option<String> {
    e.attributes().flatten().find_map(|attr| {
        if attr.key.as_ref() != name.as_bytes() {
            return None;
        }
        let value = attr
            .unescape_value()
            .map(|v| v.into_owned())
            .unwrap_or_else(|_| String::from_utf8_lossy(&attr.value).into_owned());
        Some(value)
    })
}

fn text_of(e: &quick_xml::events::BytesText<'_>) -> String {
    match e.unescape() {
        Ok(text) => text.into_owned(),
        Err(_) => String::from_utf8_lossy(e).into_owned(),
    }
}

fn collapse_whitespace(input: &str) -> String {
    input.split_whitespace().collect::<Vec<_>>().join(" ")
}

fn parse_container(raw: &str) -> anyhow::Result<String> {
    let mut reader = xml_reader(raw);
    let mut buf = Vec::new();
    loop {
        match reader.read_event_into(&mut buf) {
            Ok(Event::Start(e)) | Ok(Event::Empty(e)) => {
                if local_name(&e) == "rootfile"
                    && let Some(path) = attribute(&e, "full-path")
                {
                    return Ok(path);
                }
            }
            Ok(Event::Eof) => break,
            Ok(_) => {}
            Err(err) => return Err(err).context("read container xml"),
        }
        buf.clear();
    }
    anyhow::bail!("container.xml has no rootfile")
}

fn parse_package(raw: &str, package_key: &str) -> anyhow::Result<Package> {
    let mut reader = xml_reader(raw);
    let mut buf = Vec::new();
    let mut package = Package::default();
    let mut in_title = false;

    loop {
        match reader.read_event_into(&mut buf) {
            Ok(Event::Start(e)) => match local_name(&e).as_str() {
                "title" if package.title.is_none() => in_title = true,
                "item" => insert_manifest_item(&mut package, &e, package_key),
                "itemref" => push_itemref(&mut package, &e),
                "spine" => package.toc_id = attribute(&e, "toc"),
                _ => {}
            },
            Ok(Event::Empty(e)) => match local_name(&e).as_str() {
                "item" => insert_manifest_item(&mut package, &e, package_key),
                "itemref" => push_itemref(&mut package, &e),
                _ => {}
            },
            Ok(Event::Text(e)) if in_title => {
                let title = collapse_whitespace(&text_of(&e));
                if !title.is_empty() {
                    package.title = Some(title);
                }
            }
            Ok(Event::End(e)) => {
                if e.local_name().as_ref() == b"title" {
                    in_title = false;
                }
            }
            Ok(Event::Eof) => break,
            Ok(_) => {}
            Err(err) => return Err(err).context("read package xml"),
        }
        buf.clear();
    }

    if package.spine_idrefs.is_empty() {
        anyhow::bail!("package document has an empty spine");
    }
    Ok(package)
}

fn insert_manifest_item(package: &mut Package, e: &BytesStart<'_>, package_key: &str) {
    let (Some(id), Some(href)) = (attribute(e, "id"), attribute(e, "href")) else {
        return;
    };
    let Some(key) = canonical_key(package_key, &href) else {
        tracing::warn!(id = %id, href = %href, "manifest href cannot be resolved; skipping");
        return;
    };
    package.manifest.insert(
        id,
        ManifestItem {
            href: key,
            media_type: attribute(e, "media-type").unwrap_or_default(),
            properties: attribute(e, "properties").unwrap_or_default(),
        },
    );
}

fn push_itemref(package: &mut Package, e: &BytesStart<'_>) {
    if let Some(idref) = attribute(e, "idref") {
        package.spine_idrefs.push(idref);
    }
}

struct PendingNode {
    title: String,
    target: String,
    children: Vec<NavigationNode>,
}

impl PendingNode {
    fn new() -> Self {
        Self {
            title: String::new(),
            target: String::new(),
            children: Vec::new(),
        }
    }

    fn finish(self) -> Option<NavigationNode> {
        let title = collapse_whitespace(&self.title);
        if title.is_empty() && self.target.is_empty() && self.children.is_empty() {
            return None;
        }
        Some(NavigationNode::branch(title, self.target, self.children))
    }
}

fn attach(stack: &mut [PendingNode], roots: &mut Vec<NavigationNode>, node: NavigationNode) {
    match stack.last_mut() {
        Some(parent) => parent.children.push(node),
        None => roots.push(node),
    }
}

fn is_toc_nav(e: &BytesStart<'_>) -> bool {
    e.attributes().flatten().any(|attr| {
        let key = attr.key.as_ref();
        let is_type = key == b"epub:type" || key.ends_with(b":type") || key == b"type";
        is_type
            && String::from_utf8_lossy(&attr.value)
                .split_whitespace()
                .any(|v| v == "toc")
    })
}

/// Parses the `<nav epub:type="toc">` list of a navigation document.
fn parse_nav_toc(raw: &str, nav_key: &str) -> anyhow::Result<Vec<NavigationNode>> {
    let mut reader = xml_reader(raw);
    // Labels may split words across inline markup; whitespace is collapsed in
    // `PendingNode::finish`.
    reader.config_mut().trim_text(false);
    let mut buf = Vec::new();
    let mut roots = Vec::new();
    let mut stack: Vec<PendingNode> = Vec::new();
    let mut nav_depth = 0usize;
    let mut label_depth = 0usize;

    loop {
        match reader.read_event_into(&mut buf) {
            Ok(Event::Start(e)) => {
                let name = local_name(&e);
                if nav_depth == 0 {
                    if name == "nav" && is_toc_nav(&e) {
                        nav_depth = 1;
                    }
                } else {
                    if name == "nav" {
                        nav_depth += 1;
                    }
                    match name.as_str() {
                        "li" => stack.push(PendingNode::new()),
                        "a" | "span" if !stack.is_empty() => {
                            label_depth += 1;
                            if let Some(href) = attribute(&e, "href")
                                && let Some(node) = stack.last_mut()
                                && node.target.is_empty()
                                && let Some(key) = canonical_key(nav_key, &href)
                            {
                                node.target = key;
                            }
                        }
                        _ => {}
                    }
                }
            }
            Ok(Event::Text(e)) if nav_depth > 0 && label_depth > 0 => {
                if let Some(node) = stack.last_mut() {
                    node.title.push_str(&text_of(&e));
                }
            }
            Ok(Event::End(e)) if nav_depth > 0 => match e.local_name().as_ref() {
                b"li" => {
                    if let Some(pending) = stack.pop()
                        && let Some(node) = pending.finish()
                    {
                        attach(&mut stack, &mut roots, node);
                    }
                }
                b"a" | b"span" => label_depth = label_depth.saturating_sub(1),
                b"nav" => {
                    nav_depth -= 1;
                    if nav_depth == 0 {
                        break;
                    }
                }
                _ => {}
            },
            Ok(Event::Eof) => break,
            Ok(_) => {}
            Err(err) => return Err(err).context("read navigation xml"),
        }
        buf.clear();
    }

    while let Some(pending) = stack.pop() {
        if let Some(node) = pending.finish() {
            attach(&mut stack, &mut roots, node);
        }
    }
    Ok(roots)
}

/// Parses the `navMap` of a legacy NCX document.
fn parse_ncx(raw: &str, ncx_key: &str) -> anyhow::Result<Vec<NavigationNode>> {
    let mut reader = xml_reader(raw);
    let mut buf = Vec::new();
    let mut roots = Vec::new();
    let mut stack: Vec<PendingNode> = Vec::new();
    let mut in_label = false;
    let mut in_text = false;

    loop {
        match reader.read_event_into(&mut buf) {
            Ok(Event::Start(e)) => match local_name(&e).as_str() {
                "navpoint" => stack.push(PendingNode::new()),
                "navlabel" if !stack.is_empty() => in_label = true,
                "text" if in_label => in_text = true,
                "content" => set_ncx_target(&mut stack, &e, ncx_key),
                _ => {}
            },
            Ok(Event::Empty(e)) => {
                if local_name(&e) == "content" {
                    set_ncx_target(&mut stack, &e, ncx_key);
                }
            }
            Ok(Event::Text(e)) if in_text => {
                if let Some(node) = stack.last_mut() {
                    node.title.push_str(&text_of(&e));
                }
            }
            Ok(Event::End(e)) => match e.local_name().as_ref() {
                b"navPoint" | b"navpoint" => {
                    if let Some(pending) = stack.pop()
                        && let Some(node) = pending.finish()
                    {
                        attach(&mut stack, &mut roots, node);
                    }
                }
                b"navLabel" | b"navlabel" => in_label = false,
                b"text" => in_text = false,
                _ => {}
            },
            Ok(Event::Eof) => break,
            Ok(_) => {}
            Err(err) => return Err(err).context("read ncx xml"),
        }
        buf.clear();
    }

    Ok(roots)
}

fn set_ncx_target(stack: &mut [PendingNode], e: &BytesStart<'_>, ncx_key: &str) {
    if let Some(src) = attribute(e, "src")
        && let Some(node) = stack.last_mut()
        && node.target.is_empty()
        && let Some(key) = canonical_key(ncx_key, &src)
    {
        node.target = key;
    }
}

/// Converts an XHTML content document into plain Markdown-ish text.
pub fn markup_to_text(markup: &str) -> String {
    let body = body_inner(markup);
    let markdown = html2md::parse_html(body);
    strip_images(&markdown).trim().to_owned()
}

fn body_inner(markup: &str) -> &str {
    let lower = markup.to_ascii_lowercase();
    let Some(open) = lower.find("<body") else {
        return markup;
    };
    let Some(open_end) = lower[open..].find('>').map(|i| open + i + 1) else {
        return markup;
    };
    let close = lower.rfind("</body").filter(|&c| c >= open_end);
    match close {
        Some(close) => &markup[open_end..close],
        None => &markup[open_end..],
    }
}

/// Removes `![alt](src)` image syntax, leaving surrounding text intact.
fn strip_images(markdown: &str) -> String {
    let mut out = String::with_capacity(markdown.len());
    let mut rest = markdown;
    while let Some(start) = rest.find("![") {
        out.push_str(&rest[..start]);
        let after = &rest[start + 2..];
        let Some(end) = image_end(after) else {
            out.push_str("![");
            rest = after;
            continue;
        };
        rest = &after[end..];
    }
    out.push_str(rest);
    out
}

/// Byte length of `alt](src)` following a `![`, if it is a complete image.
fn image_end(after: &str) -> Option<usize> {
    let close_alt = after.find("](")?;
    if after[..close_alt].contains('\n') {
        return None;
    }
    let src_start = close_alt + 2;
    let close_src = after[src_start..].find(')')?;
    Some(src_start + close_src + 1)
}
