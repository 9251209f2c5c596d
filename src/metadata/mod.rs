//! Embedded audio tag access.
//!
//! The pipeline only sees the [`TagCodec`] trait and a flat [`TagRecord`].
//! [`LoftyTagCodec`] is the production implementation; it uses the lofty
//! crate for format-independent access to MP3, M4A/M4B, FLAC, OGG and WAV.
//!
//! Audiobook conventions:
//! - the book title lives in the album tag
//! - the author lives in album artist (or artist)
//! - the narrator lives in the composer frame
//! - series, series position and ASIN are custom text items

use lofty::ape::{ApeFile, ApeItem, ApeTag};
use lofty::config::{ParseOptions, WriteOptions};
use lofty::error::LoftyError;
use lofty::file::{AudioFile, FileType, TaggedFileExt};
use lofty::flac::FlacFile;
use lofty::id3::v2::Id3v2Tag;
use lofty::mp4::{Atom, AtomData, AtomIdent, Ilst, Mp4File};
use lofty::mpeg::MpegFile;
use lofty::ogg::{OpusFile, VorbisComments, VorbisFile};
use lofty::probe::Probe;
use lofty::tag::{Accessor, ItemKey, ItemValue, Tag, TagExt, TagType};
use serde::{Deserialize, Serialize};
use std::borrow::Cow;
use std::fs::File;
use std::path::{Path, PathBuf};

use crate::model::MetadataCandidate;

const SERIES_KEY: &str = "SERIES";
const SERIES_PART_KEY: &str = "SERIES-PART";
const ASIN_KEY: &str = "ASIN";
const CUSTOM_KEYS: [&str; 3] = [SERIES_KEY, SERIES_PART_KEY, ASIN_KEY];

/// Freeform atom namespace used by iTunes-style MP4 tags.
const ITUNES_MEAN: &str = "com.apple.iTunes";

/// Flat tag payload read from or written to a file.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct TagRecord {
    pub title: Option<String>,
    pub album: Option<String>,
    pub artist: Option<String>,
    pub album_artist: Option<String>,
    pub narrator: Option<String>,
    pub genre: Option<String>,
    pub year: Option<u32>,
    pub track: Option<u32>,
    pub comment: Option<String>,
    pub series: Option<String>,
    pub series_part: Option<String>,
    pub asin: Option<String>,
}

impl TagRecord {
    /// Tags for one file of a book described by `candidate`.
    ///
    /// `part` is the 1-based part number for multi-file books.
    pub fn from_candidate(candidate: &MetadataCandidate, part: Option<u32>) -> Self {
        let authors = candidate
            .authors
            .iter()
            .map(|a| a.name.as_str())
            .collect::<Vec<_>>()
            .join(", ");
        let narrators = candidate
            .narrators
            .iter()
            .map(|n| n.name.as_str())
            .collect::<Vec<_>>()
            .join(", ");
        let title = match part {
            Some(n) => format!("{} - Part {:02}", candidate.title, n),
            None => candidate.title.clone(),
        };

        Self {
            title: Some(title),
            album: Some(candidate.title.clone()),
            artist: (!authors.is_empty()).then(|| authors.clone()),
            album_artist: (!authors.is_empty()).then_some(authors),
            narrator: (!narrators.is_empty()).then_some(narrators),
            genre: candidate.genres.first().cloned(),
            year: candidate.release_year.and_then(|y| u32::try_from(y).ok()),
            track: part,
            comment: candidate.subtitle.clone(),
            series: candidate.series.as_ref().map(|s| s.name.clone()),
            series_part: candidate.series.as_ref().and_then(|s| s.position.clone()),
            asin: candidate.asin.clone(),
        }
    }
}

/// Tag access failures.
#[derive(Debug, Clone, thiserror::Error)]
pub enum TagError {
    #[error("Failed to read tags from {path}: {message}")]
    Read { path: PathBuf, message: String },

    #[error("Failed to write tags to {path}: {message}")]
    Write { path: PathBuf, message: String },
}

impl TagError {
    fn read(path: &Path, err: impl std::fmt::Display) -> Self {
        Self::Read {
            path: path.to_path_buf(),
            message: err.to_string(),
        }
    }

    fn write(path: &Path, err: impl std::fmt::Display) -> Self {
        Self::Write {
            path: path.to_path_buf(),
            message: err.to_string(),
        }
    }
}

/// Reads and writes embedded tags.
pub trait TagCodec: Send + Sync {
    fn read(&self, path: &Path) -> Result<TagRecord, TagError>;

    /// Write the set fields of `tags`. Returns whether anything was written.
    fn write(&self, path: &Path, tags: &TagRecord) -> Result<bool, TagError>;
}

/// lofty-backed codec.
#[derive(Debug, Clone, Copy, Default)]
pub struct LoftyTagCodec;

fn text(tag: &Tag, key: ItemKey) -> Option<String> {
    tag.get_string(&key).map(str::to_string)
}

fn freeform(name: &str) -> AtomIdent<'static> {
    AtomIdent::Freeform {
        mean: Cow::Borrowed(ITUNES_MEAN),
        name: Cow::Owned(name.to_string()),
    }
}

/// A format-native tag.
///
/// lofty's generic [`Tag`] drops keys it cannot map, so series and ASIN go
/// through the native item of each format: ID3v2 `TXXX`, MP4 freeform atoms,
/// Vorbis comments and APE items.
enum NativeTag {
    Id3v2(Id3v2Tag),
    Ilst(Ilst),
    Vorbis(VorbisComments),
    Ape(ApeTag),
}

impl NativeTag {
    /// Convert a generic tag, handing it back when the format has no
    /// custom text items.
    fn from_tag(tag: Tag) -> Result<Self, Tag> {
        match tag.tag_type() {
            TagType::Id3v2 => Ok(NativeTag::Id3v2(tag.into())),
            TagType::Mp4Ilst => Ok(NativeTag::Ilst(tag.into())),
            TagType::VorbisComments => Ok(NativeTag::Vorbis(tag.into())),
            TagType::Ape => Ok(NativeTag::Ape(tag.into())),
            _ => Err(tag),
        }
    }

    /// The primary native tag of the file at `path`, if it has one.
    fn read(path: &Path) -> Result<Option<Self>, LoftyError> {
        let Some(file_type) = Probe::open(path)?.guess_file_type()?.file_type() else {
            return Ok(None);
        };
        let mut file = File::open(path)?;
        let options = ParseOptions::new().read_properties(false);

        let native = match file_type {
            FileType::Mpeg => MpegFile::read_from(&mut file, options)?
                .id3v2()
                .cloned()
                .map(NativeTag::Id3v2),
            FileType::Mp4 => Mp4File::read_from(&mut file, options)?
                .ilst()
                .cloned()
                .map(NativeTag::Ilst),
            FileType::Flac => FlacFile::read_from(&mut file, options)?
                .vorbis_comments()
                .cloned()
                .map(NativeTag::Vorbis),
            FileType::Vorbis => Some(NativeTag::Vorbis(
                VorbisFile::read_from(&mut file, options)?.vorbis_comments().clone(),
            )),
            FileType::Opus => Some(NativeTag::Vorbis(
                OpusFile::read_from(&mut file, options)?.vorbis_comments().clone(),
            )),
            FileType::Ape => ApeFile::read_from(&mut file, options)?
                .ape()
                .cloned()
                .map(NativeTag::Ape),
            _ => None,
        };
        Ok(native)
    }

    fn get(&self, key: &str) -> Option<String> {
        match self {
            NativeTag::Id3v2(tag) => tag.get_user_text(key).map(str::to_string),
            NativeTag::Ilst(ilst) => ilst.get(&freeform(key)).and_then(|atom| {
                atom.data().find_map(|data| match data {
                    AtomData::UTF8(value) => Some(value.clone()),
                    _ => None,
                })
            }),
            NativeTag::Vorbis(comments) => comments.get(key).map(str::to_string),
            NativeTag::Ape(tag) => tag.get(key).and_then(|item| match item.value() {
                ItemValue::Text(value) => Some(value.clone()),
                _ => None,
            }),
        }
    }

    /// Replace any existing value for `key`.
    fn set(&mut self, key: &str, value: String) -> Result<(), LoftyError> {
        match self {
            NativeTag::Id3v2(tag) => {
                tag.insert_user_text(key.to_string(), value);
            }
            NativeTag::Ilst(ilst) => {
                ilst.replace_atom(Atom::new(freeform(key), AtomData::UTF8(value)));
            }
            NativeTag::Vorbis(comments) => comments.insert(key.to_string(), value),
            NativeTag::Ape(tag) => {
                tag.insert(ApeItem::new(key.to_string(), ItemValue::Text(value))?);
            }
        }
        Ok(())
    }

    fn save(&self, path: &Path) -> Result<(), LoftyError> {
        let options = WriteOptions::default();
        match self {
            NativeTag::Id3v2(tag) => tag.save_to_path(path, options),
            NativeTag::Ilst(ilst) => ilst.save_to_path(path, options),
            NativeTag::Vorbis(comments) => comments.save_to_path(path, options),
            NativeTag::Ape(tag) => tag.save_to_path(path, options),
        }
    }
}

impl TagCodec for LoftyTagCodec {
    fn read(&self, path: &Path) -> Result<TagRecord, TagError> {
        let tagged_file = Probe::open(path)
            .map_err(|e| TagError::read(path, e))?
            .read()
            .map_err(|e| TagError::read(path, e))?;

        // Get the primary tag, or fall back to the first available tag
        let Some(tag) = tagged_file
            .primary_tag()
            .or_else(|| tagged_file.first_tag())
        else {
            return Ok(TagRecord::default());
        };

        let native = NativeTag::read(path).map_err(|e| TagError::read(path, e))?;
        let custom = |key: &str| native.as_ref().and_then(|n| n.get(key));

        Ok(TagRecord {
            title: tag.title().map(|s| s.to_string()),
            album: tag.album().map(|s| s.to_string()),
            artist: tag.artist().map(|s| s.to_string()),
            album_artist: text(tag, ItemKey::AlbumArtist),
            narrator: text(tag, ItemKey::Composer),
            genre: tag.genre().map(|s| s.to_string()),
            year: tag.year(),
            track: tag.track(),
            comment: tag.comment().map(|s| s.to_string()),
            series: custom(SERIES_KEY),
            series_part: custom(SERIES_PART_KEY),
            asin: custom(ASIN_KEY),
        })
    }

    fn write(&self, path: &Path, tags: &TagRecord) -> Result<bool, TagError> {
        let mut tagged_file = Probe::open(path)
            .map_err(|e| TagError::write(path, e))?
            .read()
            .map_err(|e| TagError::write(path, e))?;

        let tag_type = tagged_file.primary_tag_type();
        let mut tag = tagged_file
            .remove(tag_type)
            .unwrap_or_else(|| Tag::new(tag_type));

        let mut fields_updated = 0;

        if let Some(ref title) = tags.title {
            tag.set_title(title.clone());
            fields_updated += 1;
        }
        if let Some(ref album) = tags.album {
            tag.set_album(album.clone());
            fields_updated += 1;
        }
        if let Some(ref artist) = tags.artist {
            tag.set_artist(artist.clone());
            fields_updated += 1;
        }
        if let Some(ref genre) = tags.genre {
            tag.set_genre(genre.clone());
            fields_updated += 1;
        }
        if let Some(ref comment) = tags.comment {
            tag.set_comment(comment.clone());
            fields_updated += 1;
        }
        if let Some(year) = tags.year {
            tag.set_year(year);
            fields_updated += 1;
        }
        if let Some(track) = tags.track {
            tag.set_track(track);
            fields_updated += 1;
        }

        let text_items = [
            (ItemKey::AlbumArtist, &tags.album_artist),
            (ItemKey::Composer, &tags.narrator),
        ];
        for (key, value) in text_items {
            if let Some(value) = value
                && tag.insert_text(key, value.clone())
            {
                fields_updated += 1;
            }
        }

        let custom: Vec<(&str, &String)> = CUSTOM_KEYS
            .into_iter()
            .zip([&tags.series, &tags.series_part, &tags.asin])
            .filter_map(|(key, value)| value.as_ref().map(|v| (key, v)))
            .collect();

        let saved = match NativeTag::from_tag(tag) {
            Ok(mut native) => {
                for (key, value) in custom {
                    native
                        .set(key, value.clone())
                        .map_err(|e| TagError::write(path, e))?;
                    fields_updated += 1;
                }
                if fields_updated == 0 {
                    return Ok(false);
                }
                native.save(path)
            }
            Err(tag) => {
                if !custom.is_empty() {
                    tracing::debug!(
                        target: "metadata",
                        path = %path.display(),
                        ?tag_type,
                        "Format has no custom items, skipping series and ASIN"
                    );
                }
                if fields_updated == 0 {
                    return Ok(false);
                }
                tag.save_to_path(path, WriteOptions::default())
            }
        };
        saved.map_err(|e| TagError::write(path, e))?;

        tracing::debug!(target: "metadata", path = %path.display(), fields_updated, "Wrote tags");
        Ok(true)
    }
}
