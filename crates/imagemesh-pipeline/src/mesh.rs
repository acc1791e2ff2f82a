//! Mesh values produced by a pipeline and consumed by the HTTP layer.
//!
//! A pipeline result is opaque to the rest of the service; the only thing
//! done with it is [`Mesh::export`], which picks the output format from the
//! target path's extension. OBJ is read with `tobj` and written with
//! `obj_exporter`; STL is written with `stl_io`.

use std::fmt;
use std::fs::File;
use std::io::{BufRead, BufReader, BufWriter, Write};
use std::path::{Path, PathBuf};

use obj_exporter::{Geometry, ObjSet, Object, Primitive, Shape, Vertex};
use tempfile::TempDir;

use crate::error::MeshError;

/// A generated mesh that can write itself to a file.
pub trait Mesh: Send + Sync + fmt::Debug {
    /// Write the mesh to `path` in the format named by its extension.
    fn export(&self, path: &Path) -> Result<(), MeshError>;
}

/// Mesh file formats this crate can write.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum MeshFormat {
    /// Wavefront OBJ.
    Obj,
    /// Binary STL.
    Stl,
}

impl MeshFormat {
    /// Parse a format from an extension, with or without the leading dot.
    pub fn from_extension(ext: &str) -> Option<Self> {
        match ext.trim_start_matches('.').to_ascii_lowercase().as_str() {
            "obj" => Some(Self::Obj),
            "stl" => Some(Self::Stl),
            _ => None,
        }
    }

    /// Format named by a path's extension.
    pub fn from_path(path: &Path) -> Result<Self, MeshError> {
        let ext = path
            .extension()
            .and_then(|e| e.to_str())
            .unwrap_or_default();
        Self::from_extension(ext).ok_or_else(|| MeshError::UnsupportedFormat(ext.to_string()))
    }

    /// Canonical extension without the dot.
    pub fn extension(self) -> &'static str {
        match self {
            Self::Obj => "obj",
            Self::Stl => "stl",
        }
    }
}

/// An indexed triangle mesh held in memory.
///
/// Export output depends only on the vertex and face lists, so the same
/// mesh always produces byte-identical files.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct TriangleMesh {
    vertices: Vec<[f32; 3]>,
    faces: Vec<[u32; 3]>,
}

fn obj_load_options() -> tobj::LoadOptions {
    tobj::LoadOptions {
        triangulate: true,
        ignore_points: true,
        ignore_lines: true,
        ..Default::default()
    }
}

impl TriangleMesh {
    /// Build a mesh, checking every face index against the vertex list.
    pub fn new(vertices: Vec<[f32; 3]>, faces: Vec<[u32; 3]>) -> Result<Self, MeshError> {
        let count = vertices.len();
        if let Some(&index) = faces.iter().flatten().find(|&&i| i as usize >= count) {
            return Err(MeshError::VertexOutOfRange {
                index: index as i64,
                count,
            });
        }
        Ok(Self { vertices, faces })
    }

    /// Parse Wavefront OBJ from `reader`.
    ///
    /// Polygons are triangulated and every object in the file is merged
    /// into one mesh. Material libraries are not loaded.
    pub fn read_obj(reader: &mut impl BufRead) -> Result<Self, MeshError> {
        let (models, _materials) = tobj::load_obj_buf(reader, &obj_load_options(), |_| {
            Err(tobj::LoadError::OpenFileFailed)
        })?;

        let mut vertices: Vec<[f32; 3]> = Vec::new();
        let mut faces: Vec<[u32; 3]> = Vec::new();
        for model in models {
            let base = vertices.len() as u32;
            let mesh = model.mesh;
            vertices.extend(mesh.positions.chunks_exact(3).map(|p| [p[0], p[1], p[2]]));
            faces.extend(
                mesh.indices
                    .chunks_exact(3)
                    .map(|t| [base + t[0], base + t[1], base + t[2]]),
            );
        }

        Self::new(vertices, faces)
    }

    /// Corner positions of every triangle, in face order.
    pub fn triangles(&self) -> impl Iterator<Item = [[f32; 3]; 3]> + '_ {
        self.faces
            .iter()
            .map(|face| face.map(|i| self.vertices[i as usize]))
    }

    fn obj_set(&self) -> ObjSet {
        let shapes = self
            .faces
            .iter()
            .map(|&[a, b, c]| Shape {
                primitive: Primitive::Triangle(
                    (a as usize, None, None),
                    (b as usize, None, None),
                    (c as usize, None, None),
                ),
                groups: vec![],
                smoothing_groups: vec![],
            })
            .collect();

        let object = Object {
            name: "imagemesh".to_string(),
            vertices: self
                .vertices
                .iter()
                .map(|&[x, y, z]| Vertex {
                    x: f64::from(x),
                    y: f64::from(y),
                    z: f64::from(z),
                })
                .collect(),
            tex_vertices: vec![],
            normals: vec![],
            geometry: vec![Geometry {
                material_name: None,
                shapes,
            }],
        };

        ObjSet {
            material_library: None,
            objects: vec![object],
        }
    }

    fn write_stl(&self, path: &Path) -> Result<(), MeshError> {
        let triangles: Vec<stl_io::Triangle> = self
            .triangles()
            .map(|[a, b, c]| stl_io::Triangle {
                normal: stl_io::Normal::new(unit_normal(a, b, c)),
                vertices: [a, b, c].map(stl_io::Vertex::new),
            })
            .collect();

        let mut out = BufWriter::new(File::create(path)?);
        stl_io::write_stl(&mut out, triangles.iter())?;
        out.flush()?;
        Ok(())
    }
}

impl Mesh for TriangleMesh {
    fn export(&self, path: &Path) -> Result<(), MeshError> {
        match MeshFormat::from_path(path)? {
            MeshFormat::Obj => obj_exporter::export_to_file(&self.obj_set(), path)?,
            MeshFormat::Stl => self.write_stl(path)?,
        }
        Ok(())
    }
}

fn unit_normal(a: [f32; 3], b: [f32; 3], c: [f32; 3]) -> [f32; 3] {
    let u = [b[0] - a[0], b[1] - a[1], b[2] - a[2]];
    let v = [c[0] - a[0], c[1] - a[1], c[2] - a[2]];
    let n = [
        u[1] * v[2] - u[2] * v[1],
        u[2] * v[0] - u[0] * v[2],
        u[0] * v[1] - u[1] * v[0],
    ];
    let len = (n[0] * n[0] + n[1] * n[1] + n[2] * n[2]).sqrt();
    if len > f32::EPSILON {
        [n[0] / len, n[1] / len, n[2] / len]
    } else {
        [0.0, 0.0, 0.0]
    }
}

/// A mesh that an external process already wrote to disk.
///
/// Exporting to the native format copies the file. An OBJ source can also
/// be re-encoded to STL.
#[derive(Debug)]
pub struct MeshFile {
    path: PathBuf,
    format: MeshFormat,
    // Keeps the producing job directory alive as long as the mesh.
    _workspace: Option<TempDir>,
}

impl MeshFile {
    /// Wrap an existing file; its format comes from the extension.
    pub fn new(path: PathBuf) -> Result<Self, MeshError> {
        let format = MeshFormat::from_path(&path)?;
        Ok(Self {
            path,
            format,
            _workspace: None,
        })
    }

    /// Wrap a file living inside `workspace`, which is removed on drop.
    pub fn in_workspace(path: PathBuf, workspace: TempDir) -> Result<Self, MeshError> {
        let mut mesh = Self::new(path)?;
        mesh._workspace = Some(workspace);
        Ok(mesh)
    }
}

impl Mesh for MeshFile {
    fn export(&self, path: &Path) -> Result<(), MeshError> {
        let target = MeshFormat::from_path(path)?;
        if target == self.format {
            std::fs::copy(&self.path, path)?;
            return Ok(());
        }
        match self.format {
            MeshFormat::Obj => {
                let mut reader = BufReader::new(File::open(&self.path)?);
                TriangleMesh::read_obj(&mut reader)?.export(path)
            }
            other => Err(MeshError::UnsupportedFormat(format!(
                "{} to {}",
                other.extension(),
                target.extension()
            ))),
        }
    }
}
