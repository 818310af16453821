//! Interned path names stored as a parent-pointer tree (`files.fnm`).
//!
//! Serialized as a uvarint node count followed, per node, by a uvarint name
//! length, the name bytes and a uvarint parent index. Node 0 is the root.

use std::collections::HashMap;
use std::io::{Read, Write};
use std::path::{Component, Path, PathBuf};

use crate::error::{BlotdexError, Result};
use crate::io::varint::{put_uvarint, read_uvarint};

#[derive(Debug, Clone, Default)]
struct PathNode {
    parent: u32,
    name: String,
    children: HashMap<String, u32>,
}

#[derive(Debug, Clone)]
pub struct PathTree {
    nodes: Vec<PathNode>,
}

impl Default for PathTree {
    fn default() -> Self {
        Self::new()
    }
}

impl PathTree {
    #[must_use]
    pub fn new() -> Self {
        let mut nodes = Vec::with_capacity(128);
        nodes.push(PathNode::default());
        Self { nodes }
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    /// Interns `path` (made absolute first) and returns the id of its leaf.
    pub fn add_path(&mut self, path: &Path) -> Result<u32> {
        let abs = std::path::absolute(path)?;
        let mut parent = 0u32;
        for component in abs.components() {
            let name = match component {
                Component::Normal(name) => name
                    .to_str()
                    .ok_or_else(|| BlotdexError::InvalidPath(abs.clone()))?,
                Component::ParentDir => {
                    parent = self.nodes[parent as usize].parent;
                    continue;
                }
                Component::Prefix(_) | Component::RootDir | Component::CurDir => continue,
            };
            parent = self.child(parent, name)?;
        }
        Ok(parent)
    }

    fn child(&mut self, parent: u32, name: &str) -> Result<u32> {
        if let Some(&id) = self.nodes[parent as usize].children.get(name) {
            return Ok(id);
        }
        let id = u32::try_from(self.nodes.len())
            .map_err(|_| BlotdexError::InvalidPath(PathBuf::from(name)))?;
        self.nodes[parent as usize]
            .children
            .insert(name.to_owned(), id);
        self.nodes.push(PathNode {
            parent,
            name: name.to_owned(),
            children: HashMap::new(),
        });
        Ok(id)
    }

    /// Rebuilds the absolute path of node `id`; `None` for unknown ids.
    #[must_use]
    pub fn abs(&self, id: u32) -> Option<PathBuf> {
        let mut parts = Vec::new();
        let mut node = self.nodes.get(id as usize)?;
        let mut at = id;
        while at != 0 {
            parts.push(node.name.as_str());
            at = node.parent;
            node = self.nodes.get(at as usize)?;
        }
        let mut path = PathBuf::from(std::path::MAIN_SEPARATOR_STR);
        path.extend(parts.iter().rev());
        Some(path)
    }

    pub fn write_to<W: Write>(&self, writer: &mut W) -> Result<()> {
        let mut buf = Vec::new();
        put_uvarint(&mut buf, self.nodes.len() as u64);
        for node in &self.nodes {
            put_uvarint(&mut buf, node.name.len() as u64);
            buf.extend_from_slice(node.name.as_bytes());
            put_uvarint(&mut buf, u64::from(node.parent));
        }
        writer.write_all(&buf)?;
        Ok(())
    }

    pub fn read_from<R: Read>(reader: &mut R) -> Result<Self> {
        let count = read_u32(reader)? as usize;
        if count == 0 {
            return Err(corrupt("path tree has no root"));
        }
        let mut nodes: Vec<PathNode> = Vec::with_capacity(count.min(1 << 20));
        for i in 0..count {
            let len = read_u32(reader)? as usize;
            let mut name = vec![0u8; len];
            reader.read_exact(&mut name)?;
            let name = String::from_utf8(name).map_err(|_| corrupt("path name is not utf-8"))?;
            let parent = read_u32(reader)?;
            // Parents always precede their children.
            if i > 0 {
                let parent_node = nodes
                    .get_mut(parent as usize)
                    .ok_or_else(|| corrupt(format!("node {i} has unknown parent {parent}")))?;
                parent_node.children.insert(name.clone(), i as u32);
            }
            nodes.push(PathNode {
                parent,
                name,
                children: HashMap::new(),
            });
        }
        Ok(Self { nodes })
    }
}

fn read_u32<R: Read>(reader: &mut R) -> Result<u32> {
    let value = read_uvarint(reader)?;
    u32::try_from(value).map_err(|_| corrupt(format!("overflow 32bit varint: {value}")))
}

fn corrupt(reason: impl Into<String>) -> BlotdexError {
    BlotdexError::CorruptPathTree {
        reason: reason.into(),
    }
}
