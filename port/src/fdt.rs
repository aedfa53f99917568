use core::ffi::CStr;
use thiserror::Error;

const FDT_MAGIC: u32 = 0xd00d_feed;
const FDT_HEADER_LEN: usize = 40;

const FDT_BEGIN_NODE: u32 = 0x1;
const FDT_END_NODE: u32 = 0x2;
const FDT_PROP: u32 = 0x3;
const FDT_NOP: u32 = 0x4;
const FDT_END: u32 = 0x9;

#[derive(Clone, Copy, Debug, Error, PartialEq, Eq)]
pub enum ParseError {
    #[error("devicetree header truncated")]
    InvalidHeader,
    #[error("bad devicetree magic {0:#x}")]
    InvalidMagic(u32),
    #[error("devicetree buffer is {0} bytes, header says {1}")]
    BufferTooSmall(usize, usize),
    #[error("devicetree block at {0:#x} runs past the end of the blob")]
    BlockOutOfBounds(usize),
}

pub type Result<T> = core::result::Result<T, ParseError>;

/// Big-endian cell at `offset`.
fn be_u32(bytes: &[u8], offset: usize) -> Option<u32> {
    let word = bytes.get(offset..offset.checked_add(4)?)?;
    Some(u32::from_be_bytes(word.try_into().ok()?))
}

fn align4(n: usize) -> usize {
    n + (0usize.wrapping_sub(n) & 3)
}

/// DeviceTree is a read-only view of a flattened devicetree blob, as handed
/// over by firmware.  Nothing is copied out of the blob: nodes and properties
/// are offsets into its structure block, so both are cheap to pass around.
///
/// The format is described at https://www.devicetree.org/specifications/
#[derive(Debug)]
pub struct DeviceTree<'a> {
    data: &'a [u8],
    header: FdtHeader,
}

impl<'a> DeviceTree<'a> {
    /// Validate the header of `data` and wrap it.
    pub fn new(data: &'a [u8]) -> Result<Self> {
        FdtHeader::new(data).map(|header| Self { data, header })
    }

    fn structs(&self) -> &'a [u8] {
        let start = self.header.off_dt_struct as usize;
        &self.data[start..start + self.header.size_dt_struct as usize]
    }

    fn strings(&self) -> &'a [u8] {
        let start = self.header.off_dt_strings as usize;
        &self.data[start..start + self.header.size_dt_strings as usize]
    }

    pub fn root(&self) -> Option<Node> {
        self.node_at(0, 0)
    }

    pub fn children(&self, parent: &Node) -> impl Iterator<Item = Node> + '_ {
        let mut i = parent.next_token_start;
        let depth = parent.depth + 1;
        core::iter::from_fn(move || {
            let child = self.node_at(i, depth)?;
            i = child.start + child.total_len;
            Some(child)
        })
    }

    /// Find the parent of child by walking down from the root, always into
    /// the node that encloses it.
    pub fn parent(&self, child: &Node) -> Option<Node> {
        if child.is_root() {
            return None;
        }
        let mut node = self.root()?;
        while node.depth + 1 < child.depth {
            node = self.children(&node).find(|n| n.encloses(child))?;
        }
        node.encloses(child).then_some(node)
    }

    pub fn node_name(&self, node: &Node) -> Option<&'a str> {
        Self::inline_str(self.structs(), node.name_start)
    }

    pub fn property(&self, node: &Node, name: &str) -> Option<Property> {
        self.properties(node).find(|p| self.property_name(p) == Some(name))
    }

    pub fn property_name(&self, prop: &Property) -> Option<&'a str> {
        Self::inline_str(self.strings(), prop.name_start)
    }

    pub fn property_value(&self, prop: &Property) -> Option<&'a [u8]> {
        self.structs().get(prop.value_start..prop.value_start + prop.value_len)
    }

    /// Raw value of the property called `name`, if the node has one.
    pub fn property_bytes(&self, node: &Node, name: &str) -> Option<&'a [u8]> {
        self.property(node, name).and_then(|p| self.property_value(&p))
    }

    pub fn property_value_as_u32(&self, prop: &Property) -> Option<u32> {
        self.property_value(prop).and_then(|v| be_u32(v, 0))
    }

    /// Iterate over the value of a property one 32-bit cell at a time.
    /// A trailing partial cell is ignored.
    pub fn property_cells(&self, prop: &Property) -> impl Iterator<Item = u32> + 'a {
        self.property_value(prop).unwrap_or_default().chunks_exact(4).filter_map(|c| be_u32(c, 0))
    }

    /// Return the node's #address-cells and #size-cells values as a tuple,
    /// falling back to the defaults of 2 and 1.
    pub fn address_size_cells(&self, node: Option<&Node>) -> (usize, usize) {
        let cells = |name, default| {
            node.and_then(|n| self.property(n, name))
                .and_then(|p| self.property_value_as_u32(&p))
                .map_or(default, |v| v as usize)
        };
        (cells("#address-cells", 2), cells("#size-cells", 1))
    }

    /// Does the string list value of `prop` contain `s`?
    pub fn property_value_contains(&self, prop: &Property, s: &str) -> bool {
        self.property_value(prop)
            .is_some_and(|v| v.split(|b| *b == 0).any(|bs| bs == s.as_bytes()))
    }

    /// Return the node specified by the path, or None
    pub fn find_by_path(&self, path: &str) -> Option<Node> {
        let mut components = path.split_terminator('/');
        let mut node = self.root()?;
        if components.next()? != self.node_name(&node)? {
            return None;
        }
        for component in components {
            node = self.children(&node).find(|c| self.node_name(c) == Some(component))?;
        }
        Some(node)
    }

    /// All nodes whose `device_type` is `ty`, in blob order.
    pub fn find_device_type<'s>(&'s self, ty: &'s str) -> impl Iterator<Item = Node> + 's {
        self.nodes().filter(move |n| {
            self.property(n, "device_type").is_some_and(|p| self.property_value_contains(&p, ty))
        })
    }

    fn inline_str(bytes: &'a [u8], start: usize) -> Option<&'a str> {
        CStr::from_bytes_until_nul(bytes.get(start..)?).ok()?.to_str().ok()
    }

    /// Build the node whose FDT_BEGIN_NODE is the first one at or after
    /// `start`.  Properties and NOPs in front of it are skipped; an
    /// FDT_END_NODE in front of it means the enclosing node has no further
    /// children.
    fn node_at(&self, start: usize, depth: usize) -> Option<Node> {
        let structs = self.structs();
        let mut i = start;
        let mut begin: Option<(usize, usize, usize)> = None;
        let mut nested = 0usize;

        loop {
            let token = Self::parse_token(structs, i)?;
            match token {
                Token::BeginNode { name_start, .. } => {
                    if begin.is_none() {
                        begin = Some((i, name_start, i + token.len()));
                    } else {
                        nested += 1;
                    }
                }
                Token::EndNode => {
                    let (node_start, name_start, next_token_start) = begin?;
                    if nested == 0 {
                        return Some(Node {
                            start: node_start,
                            name_start,
                            next_token_start,
                            total_len: i + token.len() - node_start,
                            depth,
                        });
                    }
                    nested -= 1;
                }
                Token::Prop { .. } | Token::Nop => {}
                Token::End => return None,
            }
            i += token.len();
        }
    }

    /// Linearly iterate over the nodes in the order they occur in the flattened device tree
    pub fn nodes(&self) -> impl Iterator<Item = Node> + '_ {
        let structs = self.structs();
        let mut i = 0;
        let mut depth = 0usize;

        core::iter::from_fn(move || loop {
            let token = Self::parse_token(structs, i)?;
            match token {
                Token::BeginNode { .. } => {
                    let node = self.node_at(i, depth)?;
                    i = node.next_token_start;
                    depth += 1;
                    return Some(node);
                }
                Token::EndNode => depth = depth.saturating_sub(1),
                Token::Prop { .. } | Token::Nop => {}
                Token::End => return None,
            }
            i += token.len();
        })
    }

    /// Properties of a node come before any of its children.
    fn properties(&self, node: &Node) -> impl Iterator<Item = Property> + '_ {
        let structs = self.structs();
        let mut i = node.next_token_start;

        core::iter::from_fn(move || loop {
            let token = Self::parse_token(structs, i)?;
            let start = i;
            match token {
                Token::Prop { name_start, value_len } => {
                    i += token.len();
                    return Some(Property { name_start, value_start: start + 12, value_len });
                }
                Token::Nop => i += token.len(),
                _ => return None,
            }
        })
    }

    fn parse_token(structs: &[u8], i: usize) -> Option<Token> {
        match be_u32(structs, i)? {
            FDT_BEGIN_NODE => {
                let name = structs.get(i + 4..)?;
                let name_len = name.iter().position(|&b| b == 0)?;
                Some(Token::BeginNode { name_start: i + 4, name_len })
            }
            FDT_END_NODE => Some(Token::EndNode),
            FDT_PROP => {
                let value_len = be_u32(structs, i + 4)? as usize;
                let name_start = be_u32(structs, i + 8)? as usize;
                structs.get(i + 12..i + 12 + value_len)?;
                Some(Token::Prop { name_start, value_len })
            }
            FDT_NOP => Some(Token::Nop),
            FDT_END => Some(Token::End),
            _ => None,
        }
    }
}

/// Flattened Devicetree header, all fields big-endian in the blob.
#[derive(Debug)]
#[allow(dead_code)]
struct FdtHeader {
    magic: u32,
    totalsize: u32,
    off_dt_struct: u32,
    off_dt_strings: u32,
    off_mem_rsvmap: u32,
    version: u32,
    last_comp_version: u32,
    boot_cpuid_phys: u32,
    size_dt_strings: u32,
    size_dt_struct: u32,
}

impl FdtHeader {
    /// Read the header from the front of `data` and check that the blocks it
    /// points at lie within `data`.
    fn new(data: &[u8]) -> Result<Self> {
        let word = |n: usize| be_u32(data, n * 4).ok_or(ParseError::InvalidHeader);
        let magic = word(0)?;
        if magic != FDT_MAGIC {
            return Err(ParseError::InvalidMagic(magic));
        }
        let header = FdtHeader {
            magic,
            totalsize: word(1)?,
            off_dt_struct: word(2)?,
            off_dt_strings: word(3)?,
            off_mem_rsvmap: word(4)?,
            version: word(5)?,
            last_comp_version: word(6)?,
            boot_cpuid_phys: word(7)?,
            size_dt_strings: word(8)?,
            size_dt_struct: word(9)?,
        };
        if data.len() < FDT_HEADER_LEN || data.len() != header.totalsize as usize {
            return Err(ParseError::BufferTooSmall(data.len(), header.totalsize as usize));
        }
        for (off, size) in [
            (header.off_dt_struct, header.size_dt_struct),
            (header.off_dt_strings, header.size_dt_strings),
        ] {
            let (off, size) = (off as usize, size as usize);
            if off.checked_add(size).map_or(true, |end| end > data.len()) {
                return Err(ParseError::BlockOutOfBounds(off));
            }
        }
        Ok(header)
    }
}

/// One of the five structure block tokens.  Offsets are relative to the
/// structure block, except a property's `name_start`, which indexes the
/// strings block.
#[derive(Debug, Copy, Clone)]
enum Token {
    BeginNode { name_start: usize, name_len: usize },
    EndNode,
    Prop { name_start: usize, value_len: usize },
    Nop,
    End,
}

impl Token {
    /// Bytes taken by the token, its payload and padding.
    fn len(&self) -> usize {
        match *self {
            Token::BeginNode { name_len, .. } => 4 + align4(name_len + 1),
            Token::Prop { value_len, .. } => 12 + align4(value_len),
            Token::EndNode | Token::Nop | Token::End => 4,
        }
    }
}

#[derive(Debug, PartialEq, Eq, Copy, Clone)]
pub struct Node {
    start: usize,            // Start of FDT_BEGIN_NODE in structs
    name_start: usize,       // Start of node name in structs
    next_token_start: usize, // First token after the name
    total_len: usize,        // Up to and including FDT_END_NODE
    depth: usize,            // 0 is the root
}

impl Node {
    fn encloses(&self, child: &Node) -> bool {
        self.start <= child.start && self.start + self.total_len >= child.start + child.total_len
    }

    pub fn is_root(&self) -> bool {
        self.depth == 0
    }

    pub fn depth(&self) -> usize {
        self.depth
    }
}

#[derive(Debug, PartialEq, Eq, Copy, Clone)]
pub struct Property {
    name_start: usize,  // Start of property name in strings
    value_start: usize, // Start of value in structs
    value_len: usize,
}

impl Property {
    pub fn len(&self) -> usize {
        self.value_len
    }

    pub fn is_empty(&self) -> bool {
        self.value_len == 0
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    /// A blob holding just a root node with one property.
    fn tiny_blob() -> Vec<u8> {
        let strings = b"model\0";
        let mut structs = Vec::new();
        for w in [FDT_BEGIN_NODE, 0, FDT_PROP, 4, 0] {
            structs.extend_from_slice(&w.to_be_bytes());
        }
        structs.extend_from_slice(b"isa\0");
        for w in [FDT_END_NODE, FDT_END] {
            structs.extend_from_slice(&w.to_be_bytes());
        }
        let off_struct = FDT_HEADER_LEN + 16;
        let off_strings = off_struct + structs.len();
        let total = off_strings + strings.len();
        let header = [
            FDT_MAGIC,
            total as u32,
            off_struct as u32,
            off_strings as u32,
            FDT_HEADER_LEN as u32,
            17,
            16,
            0,
            strings.len() as u32,
            structs.len() as u32,
        ];
        let mut blob: Vec<u8> = header.iter().flat_map(|w| w.to_be_bytes()).collect();
        blob.extend_from_slice(&[0; 16]);
        blob.extend_from_slice(&structs);
        blob.extend_from_slice(strings);
        blob
    }

    #[test]
    fn parses_minimal_blob() {
        let blob = tiny_blob();
        let dt = DeviceTree::new(&blob).unwrap();
        let root = dt.root().unwrap();
        assert!(root.is_root());
        assert_eq!(dt.node_name(&root), Some(""));
        assert_eq!(dt.property_bytes(&root, "model"), Some(&b"isa\0"[..]));
        assert_eq!(dt.children(&root).count(), 0);
        assert_eq!(dt.nodes().count(), 1);
        assert_eq!(dt.parent(&root), None);
    }

    #[test]
    fn rejects_bad_headers() {
        let mut blob = tiny_blob();
        assert_eq!(DeviceTree::new(&blob[..12]).unwrap_err(), ParseError::InvalidHeader);

        let short = &blob[..blob.len() - 1];
        assert!(matches!(DeviceTree::new(short), Err(ParseError::BufferTooSmall(_, _))));

        blob[0] = 0;
        assert_eq!(DeviceTree::new(&blob).unwrap_err(), ParseError::InvalidMagic(0x000d_feed));
    }

    #[test]
    fn rejects_struct_block_past_end() {
        let mut blob = tiny_blob();
        blob[36..40].copy_from_slice(&0x1000u32.to_be_bytes());
        assert_eq!(DeviceTree::new(&blob).unwrap_err(), ParseError::BlockOutOfBounds(56));
    }

    #[test]
    fn align() {
        assert_eq!(align4(0), 0);
        assert_eq!(align4(1), 4);
        assert_eq!(align4(4), 4);
        assert_eq!(align4(7), 8);
    }
}
