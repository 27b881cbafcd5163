use std::fmt::{Debug, Display, Formatter};

/// A four byte OpenType table tag.
#[derive(Copy, Clone, Eq, PartialEq, Ord, PartialOrd, Hash)]
pub struct Tag(pub [u8; 4]);
impl Tag {
    pub const CFF: Tag = Tag(*b"CFF ");
    pub const DSIG: Tag = Tag(*b"DSIG");
    pub const GLYF: Tag = Tag(*b"glyf");
    pub const HEAD: Tag = Tag(*b"head");
    pub const HHEA: Tag = Tag(*b"hhea");
    pub const HMTX: Tag = Tag(*b"hmtx");
    pub const LOCA: Tag = Tag(*b"loca");
    pub const MAXP: Tag = Tag(*b"maxp");

    pub const fn new(tag: &[u8; 4]) -> Tag {
        Tag(*tag)
    }

    pub fn from_u32(value: u32) -> Tag {
        Tag(value.to_be_bytes())
    }

    pub fn to_u32(self) -> u32 {
        u32::from_be_bytes(self.0)
    }

    /// Returns the index of this tag in the WOFF2 known table list, if it has one.
    pub fn known_index(self) -> Option<u8> {
        KNOWN_TAGS.iter().position(|x| *x == self).map(|x| x as u8)
    }

    /// Returns the tag stored at a given index of the WOFF2 known table list.
    pub fn from_known_index(idx: u8) -> Option<Tag> {
        KNOWN_TAGS.get(idx as usize).copied()
    }
}
impl Display for Tag {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        for byte in self.0 {
            if byte.is_ascii_graphic() || byte == b' ' {
                write!(f, "{}", byte as char)?;
            } else {
                write!(f, "\\x{byte:02x}")?;
            }
        }
        Ok(())
    }
}
impl Debug for Tag {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(f, "Tag({self})")
    }
}

/// Flag value used in the table directory for a tag stored explicitly after the flags byte.
pub(crate) const ARBITRARY_TAG_INDEX: u8 = 63;

/// The WOFF2 known table list, in directory index order.
const KNOWN_TAGS: [Tag; 63] = [
    Tag::new(b"cmap"),
    Tag::new(b"head"),
    Tag::new(b"hhea"),
    Tag::new(b"hmtx"),
    Tag::new(b"maxp"),
    Tag::new(b"name"),
    Tag::new(b"OS/2"),
    Tag::new(b"post"),
    Tag::new(b"cvt "),
    Tag::new(b"fpgm"),
    Tag::new(b"glyf"),
    Tag::new(b"loca"),
    Tag::new(b"prep"),
    Tag::new(b"CFF "),
    Tag::new(b"VORG"),
    Tag::new(b"EBDT"),
    Tag::new(b"EBLC"),
    Tag::new(b"gasp"),
    Tag::new(b"hdmx"),
    Tag::new(b"kern"),
    Tag::new(b"LTSH"),
    Tag::new(b"PCLT"),
    Tag::new(b"VDMX"),
    Tag::new(b"vhea"),
    Tag::new(b"vmtx"),
    Tag::new(b"BASE"),
    Tag::new(b"GDEF"),
    Tag::new(b"GPOS"),
    Tag::new(b"GSUB"),
    Tag::new(b"EBSC"),
    Tag::new(b"JSTF"),
    Tag::new(b"MATH"),
    Tag::new(b"CBDT"),
    Tag::new(b"CBLC"),
    Tag::new(b"COLR"),
    Tag::new(b"CPAL"),
    Tag::new(b"SVG "),
    Tag::new(b"sbix"),
    Tag::new(b"acnt"),
    Tag::new(b"avar"),
    Tag::new(b"bdat"),
    Tag::new(b"bloc"),
    Tag::new(b"bsln"),
    Tag::new(b"cvar"),
    Tag::new(b"fdsc"),
    Tag::new(b"feat"),
    Tag::new(b"fmtx"),
    Tag::new(b"fvar"),
    Tag::new(b"gvar"),
    Tag::new(b"hsty"),
    Tag::new(b"just"),
    Tag::new(b"lcar"),
    Tag::new(b"mort"),
    Tag::new(b"morx"),
    Tag::new(b"opbd"),
    Tag::new(b"prop"),
    Tag::new(b"trak"),
    Tag::new(b"Zapf"),
    Tag::new(b"Silf"),
    Tag::new(b"Glat"),
    Tag::new(b"Gloc"),
    Tag::new(b"Feat"),
    Tag::new(b"Sill"),
];
