//! The modifier: rewrites outer and/or info-level fields of an existing
//! torrent without re-hashing content. Outer-only edits preserve the
//! info hash exactly; any info-level edit re-serializes the info
//! dictionary, changing it by design.

use std::path::{Path, PathBuf};

use crate::error::Result;
use crate::metainfo::{
    default_output_path, now_unix, random_entropy, sanitize_filename_component, write_atomic,
    DecodedMetaInfo, InfoSource, MetaInfo, PROGRAM_NAME, PROGRAM_REPO, PROGRAM_VERSION,
};

/// A field that the caller may leave untouched, explicitly clear, or
/// set to a new value — the tri-state REDESIGN FLAG resolution, used
/// instead of sentinel values for layered preset/CLI override merging.
#[derive(Debug, Clone, Default, PartialEq)]
pub enum FieldEdit<T> {
    #[default]
    Unset,
    Clear,
    Set(T),
}

#[derive(Debug, Clone, Default)]
pub struct ModifyOptions {
    /// `None`: leave announce/announce-list untouched. `Some(list)`:
    /// replace with `list` (an empty list clears both fields).
    pub trackers: Option<Vec<String>>,
    /// Same convention as `trackers`, applied to `url-list`.
    pub webseeds: Option<Vec<String>>,
    pub comment: FieldEdit<String>,
    pub private: FieldEdit<bool>,
    pub source: FieldEdit<String>,
    /// `Set(())` regenerates a fresh random entropy value.
    pub entropy: FieldEdit<()>,
    pub no_creator: bool,
    pub no_date: bool,
    pub output_path: Option<PathBuf>,
    /// Preset name or other caller-chosen filename prefix, used when
    /// no tracker-derived label is wanted.
    pub output_prefix: Option<String>,
    pub skip_prefix: bool,
    /// When set, compute and return the result without writing it.
    pub dry_run: bool,
}

pub struct ModifyResult {
    pub metainfo: MetaInfo,
    pub bytes: Vec<u8>,
    pub output_path: PathBuf,
    pub info_hash: [u8; 20],
    pub info_hash_changed: bool,
    pub wrote: bool,
}

pub fn modify(torrent_path: &Path, opts: &ModifyOptions) -> Result<ModifyResult> {
    let data = std::fs::read(torrent_path).map_err(|e| crate::error::Error::io(torrent_path, e))?;
    let decoded = DecodedMetaInfo::load(&data)?;
    let original_hash = decoded.info_hash();

    let info_changed = opts.private != FieldEdit::Unset
        || opts.source != FieldEdit::Unset
        || opts.entropy != FieldEdit::Unset;

    let info = if info_changed {
        let mut dict = decoded.to_info_dict()?;
        match &opts.private {
            FieldEdit::Unset => {}
            FieldEdit::Clear => dict.private = false,
            FieldEdit::Set(v) => dict.private = *v,
        }
        match &opts.source {
            FieldEdit::Unset => {}
            FieldEdit::Clear => dict.source = None,
            FieldEdit::Set(s) => dict.source = Some(s.clone()),
        }
        match &opts.entropy {
            FieldEdit::Unset => {}
            FieldEdit::Clear => dict.entropy = None,
            FieldEdit::Set(()) => dict.entropy = Some(random_entropy()),
        }
        InfoSource::Built(dict)
    } else {
        InfoSource::Raw(decoded.info_bytes().to_vec())
    };

    let (announce, announce_list) = match &opts.trackers {
        None => (decoded.announce(), decoded.announce_list_tiers()?),
        Some(list) if list.is_empty() => (None, Vec::new()),
        Some(list) => (list.first().cloned(), vec![list.clone()]),
    };

    let url_list = match &opts.webseeds {
        None => decoded.url_list()?,
        Some(list) => list.clone(),
    };

    let comment = match &opts.comment {
        FieldEdit::Unset => decoded.comment(),
        FieldEdit::Clear => None,
        FieldEdit::Set(s) => Some(s.clone()),
    };

    let created_by =
        (!opts.no_creator).then(|| format!("{PROGRAM_NAME}/{PROGRAM_VERSION} ({PROGRAM_REPO})"));
    let creation_date = (!opts.no_date).then(now_unix);

    let metainfo = MetaInfo {
        announce,
        announce_list,
        url_list,
        comment,
        created_by,
        creation_date,
        info: Some(info),
    };

    let bytes = metainfo.to_bencode().encode();
    let info_hash = metainfo.info_hash()?;

    let name = decoded.name().unwrap_or_else(|_| {
        torrent_path
            .file_stem()
            .map(|s| s.to_string_lossy().into_owned())
            .unwrap_or_else(|| "torrent".to_string())
    });
    let output_path = modify_output_path(torrent_path, &name, opts, metainfo.announce.as_deref());

    let wrote = if opts.dry_run {
        false
    } else {
        write_atomic(&output_path, &bytes)?;
        true
    };

    Ok(ModifyResult {
        metainfo,
        bytes,
        output_path,
        info_hash,
        info_hash_changed: info_hash != original_hash,
        wrote,
    })
}

fn modify_output_path(
    torrent_path: &Path,
    info_name: &str,
    opts: &ModifyOptions,
    tracker_url: Option<&str>,
) -> PathBuf {
    if let Some(path) = &opts.output_path {
        return path.clone();
    }

    let original_basename = torrent_path
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_else(|| format!("{info_name}.torrent"));

    if opts.skip_prefix {
        return PathBuf::from(original_basename);
    }

    if let Some(prefix) = &opts.output_prefix {
        let sanitized = sanitize_filename_component(prefix);
        if !sanitized.is_empty() {
            return PathBuf::from(format!("{sanitized}_{original_basename}"));
        }
    }

    default_output_path(info_name, tracker_url, false)
}
