//! Kernel source synthesis
//!
//! Every synthesized translation unit has the same shape:
//!
//! ```text
//! <header: loop macro, CArray, CIndexer>
//! <typedefs for the resolved types>
//! <user preamble>
//! extern "C" __global__ void <name>(<params>) {
//!   <loop_prep>;
//!   ELEMWISE_FOR(i, _ind.size()) {
//!     _ind.set(i);
//!     <per-element bindings of non-raw arrays>
//!     <operation>;
//!   }
//!   <after_loop>;
//! }
//! ```

use super::args::{ArgInfo, ArgKind};
use super::param::{INDEXER_NAME, ParamInfo, ParamKind, RAW_PREFIX};
use super::types::TypeSignature;
use crate::dtype::DType;
use crate::error::{Error, Result};
use std::fmt::Write;
use std::sync::Arc;

/// Largest array or iteration rank a synthesized kernel accepts
pub const MAX_NDIM: usize = 8;

/// How resolved types are named inside the kernel body
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum TypedefStyle {
    /// One `typedef` per bound generic tag (`typedef float T;`)
    Tags,
    /// Positional aliases `in0_type`, `out0_type`, ... for universal functions
    Positional,
}

/// Everything about a kernel that is fixed at construction time
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub struct KernelTemplate {
    /// Entry point name
    pub name: String,
    /// Inputs, then outputs, then the indexer
    pub params: Arc<[ParamInfo]>,
    /// Number of input parameters
    pub nin: usize,
    /// Per-element body
    pub operation: String,
    /// Source inserted after the typedefs
    pub preamble: String,
    /// Statements before the loop
    pub loop_prep: String,
    /// Statements after the loop
    pub after_loop: String,
    /// Extra native compiler options
    pub options: Vec<String>,
    /// Typedef naming scheme
    pub style: TypedefStyle,
}

/// Synthesized native kernel source
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub struct KernelSource {
    /// Entry point name
    pub name: String,
    /// Complete translation unit
    pub code: String,
    /// Native compiler options
    pub options: Vec<String>,
}

// Multi-index subscripts take the index array by reference so that an
// integer literal only matches the linear overload.
const HEADER: &str = r#"#define ELEMWISE_FOR(i, n) \
  for (long long i = (long long)blockIdx.x * blockDim.x + threadIdx.x; \
       i < (long long)(n); i += (long long)blockDim.x * gridDim.x)

template <typename T, int ndim>
class CArray {
 public:
  T* data_;
  long long size_;
  long long shape_[8];
  long long strides_[8];

  __device__ long long size() const { return size_; }
  __device__ const long long* shape() const { return shape_; }
  __device__ const long long* strides() const { return strides_; }

  __device__ T& operator[](const long long (&idx)[8]) const {
    long long off = 0;
    for (int d = 0; d < ndim; ++d) off += idx[d] * strides_[d];
    return data_[off];
  }

  __device__ T& operator[](long long i) const {
    long long off = 0;
    for (int d = ndim - 1; d >= 0; --d) {
      off += (i % shape_[d]) * strides_[d];
      i /= shape_[d];
    }
    return data_[off];
  }
};

template <int ndim>
class CIndexer {
 public:
  long long size_;
  long long shape_[8];
  long long index_[8];

  __device__ long long size() const { return size_; }

  __device__ void set(long long i) {
    for (int d = ndim - 1; d >= 0; --d) {
      index_[d] = i % shape_[d];
      i /= shape_[d];
    }
  }

  __device__ const long long (&get() const)[8] { return index_; }
};
"#;

const FLOAT16_HEADER: &str = "#include <cuda_fp16.h>\ntypedef __half float16;\n";

/// Assemble the source for one resolved call
///
/// `args` describes the marshalled arguments in parameter order, indexer
/// last. `out_raw_types` are the dtypes of the actual output arrays; they
/// only matter for [`TypedefStyle::Positional`], where each output is
/// bound through its own element type.
pub fn synthesize(
    template: &KernelTemplate,
    args: &[ArgInfo],
    types: &TypeSignature,
    out_raw_types: &[DType],
) -> Result<KernelSource> {
    if args.len() != template.params.len() {
        return Err(Error::Internal(format!(
            "kernel '{}' takes {} arguments, got {}",
            template.name,
            template.params.len(),
            args.len()
        )));
    }
    if let Some(a) = args.iter().find(|a| a.ndim > MAX_NDIM) {
        return Err(Error::value_error(
            &template.name,
            format!("rank {} exceeds the supported maximum of {MAX_NDIM}", a.ndim),
        ));
    }

    let uses_f16 = args.iter().any(|a| a.dtype == Some(DType::F16))
        || types.in_types.contains(&DType::F16)
        || types.out_types.contains(&DType::F16)
        || out_raw_types.contains(&DType::F16);

    let mut code = String::with_capacity(HEADER.len() + 1024);
    code.push_str(HEADER);
    if uses_f16 {
        code.push_str(FLOAT16_HEADER);
    }
    code.push('\n');

    match template.style {
        TypedefStyle::Tags => {
            for (tag, dt) in &types.bindings {
                let _ = writeln!(code, "typedef {} {tag};", dt.c_type());
            }
        }
        TypedefStyle::Positional => {
            for (k, dt) in types.in_types.iter().enumerate() {
                let _ = writeln!(code, "typedef {} in{k}_type;", dt.c_type());
            }
            for (k, dt) in types.out_types.iter().enumerate() {
                let _ = writeln!(code, "typedef {} out{k}_type;", dt.c_type());
            }
        }
    }
    code.push_str(&template.preamble);
    code.push('\n');

    let params = template
        .params
        .iter()
        .zip(args)
        .map(|(p, a)| param_decl(p, a))
        .collect::<Result<Vec<_>>>()?
        .join(", ");

    let _ = writeln!(code, "extern \"C\" __global__ void {}({params}) {{", template.name);
    let _ = writeln!(code, "  {};", template.loop_prep);
    let _ = writeln!(code, "  ELEMWISE_FOR(i, {INDEXER_NAME}.size()) {{");
    let _ = writeln!(code, "    {INDEXER_NAME}.set(i);");
    for line in bindings(template, args, out_raw_types) {
        let _ = writeln!(code, "    {line}");
    }
    let _ = writeln!(code, "    {};", template.operation);
    code.push_str("  }\n");
    let _ = writeln!(code, "  {};", template.after_loop);
    code.push_str("}\n");

    Ok(KernelSource {
        name: template.name.clone(),
        code,
        options: template.options.clone(),
    })
}

fn param_decl(p: &ParamInfo, a: &ArgInfo) -> Result<String> {
    let constness = if p.is_const { "const " } else { "" };
    let ctype = |a: &ArgInfo| {
        a.dtype
            .map(DType::c_type)
            .ok_or_else(|| Error::Internal(format!("argument '{}' has no element type", p.name)))
    };
    Ok(match a.kind {
        ArgKind::Indexer => format!("CIndexer<{}> {}", a.ndim, p.name),
        ArgKind::Scalar => format!("{constness}{} {}", ctype(a)?, p.name),
        ArgKind::Array => {
            let prefix = if p.raw { "" } else { RAW_PREFIX };
            format!(
                "{constness}CArray<{}, {}> {prefix}{}",
                ctype(a)?,
                a.ndim,
                p.name
            )
        }
    })
}

/// Per-element reference lines for every non-raw array parameter
fn bindings(template: &KernelTemplate, args: &[ArgInfo], out_raw_types: &[DType]) -> Vec<String> {
    let mut lines = Vec::new();
    for (k, (p, a)) in template.params.iter().zip(args).enumerate() {
        if p.raw || a.kind != ArgKind::Array {
            continue;
        }
        let is_output = k >= template.nin;
        let ty = match template.style {
            TypedefStyle::Tags => match p.kind {
                ParamKind::Generic(tag) => tag.to_string(),
                ParamKind::Concrete(dt) => dt.c_type().to_string(),
                ParamKind::Indexer => continue,
            },
            TypedefStyle::Positional if is_output => match out_raw_types.get(k - template.nin) {
                Some(dt) => dt.c_type().to_string(),
                None => format!("out{}_type", k - template.nin),
            },
            TypedefStyle::Positional => format!("in{k}_type"),
        };
        let n = &p.name;
        lines.push(if is_output {
            format!("{ty} &{n} = {RAW_PREFIX}{n}[{INDEXER_NAME}.get()];")
        } else {
            format!("const {ty} {n} = {RAW_PREFIX}{n}[{INDEXER_NAME}.get()];")
        });
    }
    lines
}
