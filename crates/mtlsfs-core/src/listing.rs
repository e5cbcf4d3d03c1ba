//! Directory listings.
//!
//! A listing is produced in two steps: [`read_directory`] collects the
//! entries of a directory (directories first, then files, each group in the
//! order the filesystem enumerates them) and [`Listing::render`] turns them
//! into an HTML page whose links point back into the same request tree.

use crate::error::{AccessError, AccessResult};
use percent_encoding::{utf8_percent_encode, AsciiSet, CONTROLS};
use std::borrow::Cow;
use std::fmt;
use std::fs;
use std::io;
use std::path::Path;
use tracing::trace;

/// Characters escaped inside listing hrefs. `/` is kept so links stay paths.
const HREF_ESCAPE: &AsciiSet = &CONTROLS
    .add(b' ')
    .add(b'"')
    .add(b'#')
    .add(b'%')
    .add(b'<')
    .add(b'>')
    .add(b'?')
    .add(b'`')
    .add(b'{')
    .add(b'}');

/// One row of a directory listing.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DirectoryEntry {
    pub name: String,
    pub is_directory: bool,
    /// Size in bytes; always 0 for directories.
    pub size: u64,
    /// Request path of the entry: the listing's request path plus `name`.
    pub uri: String,
}

impl DirectoryEntry {
    pub fn directory(name: impl Into<String>, uri: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            is_directory: true,
            size: 0,
            uri: uri.into(),
        }
    }

    pub fn file(name: impl Into<String>, size: u64, uri: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            is_directory: false,
            size,
            uri: uri.into(),
        }
    }
}

/// Read the entries of `dir` for a listing requested at `request_path`.
///
/// `request_path` is expected to end with `/`. Entry metadata is read without
/// following symlinks. Entries that disappear while the directory is being
/// read are skipped.
pub fn read_directory(dir: &Path, request_path: &str) -> AccessResult<Vec<DirectoryEntry>> {
    let read_dir = fs::read_dir(dir).map_err(|e| AccessError::from_io(dir, e))?;

    let mut directories = Vec::new();
    let mut files = Vec::new();

    for entry in read_dir {
        let entry = entry.map_err(|e| AccessError::from_io(dir, e))?;
        let metadata = match entry.metadata() {
            Ok(m) => m,
            Err(e) if e.kind() == io::ErrorKind::NotFound => continue,
            Err(e) => return Err(AccessError::from_io(entry.path(), e)),
        };

        let name = entry.file_name().to_string_lossy().into_owned();
        let uri = format!("{request_path}{name}");
        if metadata.is_dir() {
            directories.push(DirectoryEntry::directory(name, uri));
        } else {
            files.push(DirectoryEntry::file(name, metadata.len(), uri));
        }
    }

    trace!(
        dir = %dir.display(),
        directories = directories.len(),
        files = files.len(),
        "Read directory"
    );

    directories.extend(files);
    Ok(directories)
}

/// A renderable directory listing page.
#[derive(Debug, Clone)]
pub struct Listing {
    /// Page title: the request URI as sent by the client.
    pub title: String,
    /// Subject of the certificate the page was requested with.
    pub logged_in: String,
    pub entries: Vec<DirectoryEntry>,
}

impl Listing {
    pub fn new(title: impl Into<String>, logged_in: impl Into<String>, entries: Vec<DirectoryEntry>) -> Self {
        Self {
            title: title.into(),
            logged_in: logged_in.into(),
            entries,
        }
    }

    /// Render the listing as an HTML document.
    pub fn render(&self) -> AccessResult<String> {
        let mut html = String::with_capacity(512 + self.entries.len() * 128);
        self.render_into(&mut html)?;
        Ok(html)
    }

    /// Render the listing into an arbitrary writer.
    pub fn render_into<W: fmt::Write>(&self, out: &mut W) -> AccessResult<()> {
        self.write_html(out)
            .map_err(|e| AccessError::Render(format!("listing for {}: {e}", self.title)))
    }

    fn write_html<W: fmt::Write>(&self, out: &mut W) -> fmt::Result {
        let title = escape_html(&self.title);
        writeln!(out, "<!DOCTYPE html>")?;
        writeln!(out, "<html>")?;
        writeln!(out, "<head>")?;
        writeln!(out, "<meta charset=\"utf-8\">")?;
        writeln!(out, "<title>{title}</title>")?;
        writeln!(out, "</head>")?;
        writeln!(out, "<body>")?;
        writeln!(out, "<h1>{title}</h1>")?;
        writeln!(out, "<p>Logged in as: {}</p>", escape_html(&self.logged_in))?;
        writeln!(out, "<table>")?;
        writeln!(out, "<tr><th>Name</th><th>Size</th></tr>")?;
        for entry in &self.entries {
            let href = utf8_percent_encode(&entry.uri, HREF_ESCAPE).to_string();
            let href = escape_html(&href);
            let name = escape_html(&entry.name);
            if entry.is_directory {
                writeln!(out, "<tr class=\"dir\"><td><a href=\"{href}\">{name}/</a></td><td></td></tr>")?;
            } else {
                writeln!(
                    out,
                    "<tr class=\"file\"><td><a href=\"{href}\">{name}</a></td><td>{}</td></tr>",
                    entry.size
                )?;
            }
        }
        writeln!(out, "</table>")?;
        writeln!(out, "</body>")?;
        write!(out, "</html>")
    }
}

fn escape_html(input: &str) -> Cow<'_, str> {
    if !input.contains(['&', '<', '>', '"', '\'']) {
        return Cow::Borrowed(input);
    }
    let mut escaped = String::with_capacity(input.len() + 16);
    for c in input.chars() {
        match c {
            '&' => escaped.push_str("&amp;"),
            '<' => escaped.push_str("&lt;"),
            '>' => escaped.push_str("&gt;"),
            '"' => escaped.push_str("&quot;"),
            '\'' => escaped.push_str("&#39;"),
            c => escaped.push(c),
        }
    }
    Cow::Owned(escaped)
}
