use std::fs::File;
use std::io::Write as _;
use std::path::Path;

use zip::write::SimpleFileOptions;

#[allow(dead_code)]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NavFlavor {
    /// EPUB 3 navigation document plus an NCX.
    Modern,
    /// NCX only.
    Legacy,
}

#[derive(Debug, Clone)]
pub struct Document {
    /// Path relative to the package directory (`OEBPS/`).
    pub file: String,
    pub body: String,
}

#[derive(Debug, Clone)]
pub struct TocEntry {
    pub title: String,
    pub href: String,
    pub children: Vec<TocEntry>,
}

impl TocEntry {
    pub fn leaf(title: &str, href: &str) -> Self {
        Self {
            title: title.to_owned(),
            href: href.to_owned(),
            children: Vec::new(),
        }
    }

    pub fn branch(title: &str, href: &str, children: Vec<TocEntry>) -> Self {
        Self {
            title: title.to_owned(),
            href: href.to_owned(),
            children,
        }
    }
}

#[derive(Debug, Clone)]
pub struct BookFixture {
    pub title: Option<String>,
    pub documents: Vec<Document>,
    pub toc: Vec<TocEntry>,
    pub nav: NavFlavor,
}

/// Six spine units: a cover, an image-only title page followed by the body
/// of chapter 1, chapters 2 and 3, and an image-only afterword. The table of
/// contents nests chapter 3 under a part and names one missing file.
pub fn sample_book(nav: NavFlavor) -> BookFixture {
    let image = |name: &str| format!(r#"<p><img src="images/{name}.png" alt="{name}"/></p>"#);
    BookFixture {
        title: Some("Sample Book".to_owned()),
        documents: vec![
            Document {
                file: "text/cover.xhtml".to_owned(),
                body: image("cover"),
            },
            Document {
                file: "text/ch1-title.xhtml".to_owned(),
                body: image("chapter-one"),
            },
            Document {
                file: "text/ch1-body.xhtml".to_owned(),
                body: "<p>The first chapter introduces the lighthouse keeper.</p>".to_owned(),
            },
            Document {
                file: "text/ch2.xhtml".to_owned(),
                body: "<h2>Storm</h2><p>A storm &amp; a shipwreck arrive.</p>".to_owned(),
            },
            Document {
                file: "text/ch3.xhtml".to_owned(),
                body: "<p>The keeper rescues the crew.</p>".to_owned(),
            },
            Document {
                file: "text/afterword.xhtml".to_owned(),
                body: image("afterword"),
            },
        ],
        toc: vec![
            TocEntry::leaf("Chapter 1", "text/ch1-title.xhtml"),
            TocEntry::leaf("Chapter 2", "text/ch2.xhtml"),
            TocEntry::branch(
                "Part Two",
                "text/ch3.xhtml",
                vec![TocEntry::leaf("Chapter 3", "text/ch3.xhtml#start")],
            ),
            TocEntry::leaf("Missing", "text/missing.xhtml"),
            TocEntry::leaf("Afterword", "text/afterword.xhtml"),
        ],
        nav,
    }
}

pub fn write_epub(path: &Path, book: &BookFixture) -> anyhow::Result<()> {
    let file = File::create(path)?;
    let mut zip = zip::ZipWriter::new(file);

    let stored = SimpleFileOptions::default().compression_method(zip::CompressionMethod::Stored);
    let deflated =
        SimpleFileOptions::default().compression_method(zip::CompressionMethod::Deflated);

    zip.start_file("mimetype", stored)?;
    zip.write_all(b"application/epub+zip")?;

    zip.start_file("META-INF/container.xml", deflated)?;
    zip.write_all(render_container_xml().as_bytes())?;

    zip.start_file("OEBPS/content.opf", deflated)?;
    zip.write_all(render_content_opf(book).as_bytes())?;

    zip.start_file("OEBPS/toc.ncx", deflated)?;
    zip.write_all(render_toc_ncx(book).as_bytes())?;

    if book.nav == NavFlavor::Modern {
        zip.start_file("OEBPS/nav.xhtml", deflated)?;
        zip.write_all(render_nav_xhtml(book).as_bytes())?;
    }

    for doc in &book.documents {
        zip.start_file(format!("OEBPS/{}", doc.file), deflated)?;
        zip.write_all(wrap_xhtml_document(&doc.file, &doc.body).as_bytes())?;
    }

    zip.finish()?;
    Ok(())
}

fn item_id(file: &str) -> String {
    file.trim_start_matches("text/")
        .trim_end_matches(".xhtml")
        .replace(['/', '.'], "-")
}

fn render_container_xml() -> String {
    r#"<?xml version="1.0" encoding="UTF-8"?>
<container version="1.0" xmlns="urn:oasis:names:tc:opendocument:xmlns:container">
  <rootfiles>
    <rootfile full-path="OEBPS/content.opf" media-type="application/oebps-package+xml"/>
  </rootfiles>
</container>
"#
    .to_owned()
}

fn render_content_opf(book: &BookFixture) -> String {
    let mut out = String::new();
    out.push_str("<?xml version=\"1.0\" encoding=\"utf-8\"?>\n");
    out.push_str(
        "<package xmlns=\"http://www.idpf.org/2007/opf\" unique-identifier=\"bookid\" version=\"3.0\">\n",
    );
    out.push_str("  <metadata xmlns:dc=\"http://purl.org/dc/elements/1.1/\">\n");
    out.push_str("    <dc:identifier id=\"bookid\">urn:uuid:fixture</dc:identifier>\n");
    if let Some(title) = book.title.as_deref() {
        out.push_str(&format!("    <dc:title>{}</dc:title>\n", xml_escape(title)));
    }
    out.push_str("  </metadata>\n");
    out.push_str("  <manifest>\n");
    if book.nav == NavFlavor::Modern {
        out.push_str(
            "    <item id=\"nav\" href=\"nav.xhtml\" media-type=\"application/xhtml+xml\" properties=\"nav\" />\n",
        );
    }
    out.push_str(
        "    <item id=\"ncx\" href=\"toc.ncx\" media-type=\"application/x-dtbncx+xml\" />\n",
    );
    for doc in &book.documents {
        out.push_str(&format!(
            "    <item id=\"{}\" href=\"{}\" media-type=\"application/xhtml+xml\" />\n",
            item_id(&doc.file),
            xml_escape(&doc.file)
        ));
    }
    out.push_str("  </manifest>\n");
    out.push_str("  <spine toc=\"ncx\">\n");
    for doc in &book.documents {
        out.push_str(&format!("    <itemref idref=\"{}\" />\n", item_id(&doc.file)));
    }
    out.push_str("  </spine>\n");
    out.push_str("</package>\n");
    out
}

fn render_nav_xhtml(book: &BookFixture) -> String {
    fn render_list(out: &mut String, entries: &[TocEntry], indent: usize) {
        let pad = " ".repeat(indent);
        out.push_str(&format!("{pad}<ol>\n"));
        for entry in entries {
            out.push_str(&format!(
                "{pad}  <li><a href=\"{}\">{}</a>\n",
                xml_escape(&entry.href),
                xml_escape(&entry.title)
            ));
            if !entry.children.is_empty() {
                render_list(out, &entry.children, indent + 4);
            }
            out.push_str(&format!("{pad}  </li>\n"));
        }
        out.push_str(&format!("{pad}</ol>\n"));
    }

    let mut out = String::new();
    out.push_str("<?xml version=\"1.0\" encoding=\"utf-8\"?>\n");
    out.push_str("<!DOCTYPE html>\n");
    out.push_str(
        "<html xmlns=\"http://www.w3.org/1999/xhtml\" xmlns:epub=\"http://www.idpf.org/2007/ops\">\n",
    );
    out.push_str("<head><title>Contents</title></head>\n");
    out.push_str("<body>\n");
    out.push_str("  <nav epub:type=\"toc\" id=\"toc\">\n");
    out.push_str("    <h1>Contents</h1>\n");
    render_list(&mut out, &book.toc, 4);
    out.push_str("  </nav>\n");
    out.push_str("</body>\n");
    out.push_str("</html>\n");
    out
}

fn render_toc_ncx(book: &BookFixture) -> String {
    fn render_points(out: &mut String, entries: &[TocEntry], play: &mut usize, indent: usize) {
        let pad = " ".repeat(indent);
        for entry in entries {
            *play += 1;
            out.push_str(&format!(
                "{pad}<navPoint id=\"navPoint-{play}\" playOrder=\"{play}\">\n"
            ));
            out.push_str(&format!(
                "{pad}  <navLabel><text>{}</text></navLabel>\n",
                xml_escape(&entry.title)
            ));
            out.push_str(&format!(
                "{pad}  <content src=\"{}\" />\n",
                xml_escape(&entry.href)
            ));
            render_points(out, &entry.children, play, indent + 2);
            out.push_str(&format!("{pad}</navPoint>\n"));
        }
    }

    let mut out = String::new();
    out.push_str("<?xml version=\"1.0\" encoding=\"utf-8\"?>\n");
    out.push_str("<ncx xmlns=\"http://www.daisy.org/z3986/2005/ncx/\" version=\"2005-1\">\n");
    out.push_str("  <docTitle><text>");
    out.push_str(&xml_escape(book.title.as_deref().unwrap_or("")));
    out.push_str("</text></docTitle>\n");
    out.push_str("  <navMap>\n");
    let mut play = 0;
    render_points(&mut out, &book.toc, &mut play, 4);
    out.push_str("  </navMap>\n");
    out.push_str("</ncx>\n");
    out
}

fn wrap_xhtml_document(title: &str, body_html: &str) -> String {
    format!(
        "<?xml version=\"1.0\" encoding=\"utf-8\"?>\n\
<!DOCTYPE html>\n\
<html xmlns=\"http://www.w3.org/1999/xhtml\">\n\
<head>\n  <title>{}</title>\n</head>\n\
<body>\n{body_html}\n</body>\n\
</html>\n",
        xml_escape(title)
    )
}

fn xml_escape(input: &str) -> String {
    input
        .replace('&', "&amp;")
        .replace('<', "&lt;")
        .replace('>', "&gt;")
        .replace('"', "&quot;")
}
