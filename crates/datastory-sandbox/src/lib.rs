//! datastory-sandbox: runs model-generated analysis code against a private
//! copy of a dataset sample and persists the figures it produces.
//!
//! Execution happens in a separate interpreter process started with a cleared
//! environment inside a throwaway working directory. A harness script binds a
//! fixed set of names, restricts builtins and imports, captures the `results`
//! variable and any open figures, and always closes its plotting state.
//! The bound `io` name exposes only the in-memory buffers. Network access is
//! not blocked at the process level, and the data libraries themselves can
//! still reach the filesystem (`pd.read_csv`, `np.load`, `plt.savefig` with an
//! absolute path), so the interpreter should run as an unprivileged user.

pub mod error;
pub mod executor;
pub mod figures;

pub use error::SandboxError;
pub use executor::{CodeExecutor, ExecutionOutcome, FailureKind, PythonExecutor, RenderedFigure};
pub use figures::FigureStore;
