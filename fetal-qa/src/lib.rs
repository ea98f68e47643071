#![warn(missing_docs)]

//! 核心库. 对胎儿脑 MRI (nifti 格式) 体数据进行前景裁剪、强度规范化与定长填充,
//! 然后批量交给外部回归模型评分, 并按阈值挑选合格的体数据.
//!
//! # 处理流程
//!
//! 文件路径 -> [`MriVolume`] -> [`CroppedVolume`] -> [`PaddedVolume`]
//! -> (整批) [`score::BatchScorer`] -> [`select::SelectionPolicy`].
//!
//! 完整的一次运行由 [`pipeline::run`] 驱动.
//!
//! # 注意
//!
//! 1. 体数据一律按 nifti 原生的 `(x, y, z)` 顺序访问, 与 affine 矩阵的列一一对应.
//! 2. 评分需要整批体数据同时驻留内存, 内存占用约为
//!   `文件数 * 217 * 178 * 60 * 4` 字节.
//! 3. 模型本身不在该 crate 的职责内, 只通过 [`score::QualityModel`] 接入.
//!
//! # 开发计划
//!
//! ### 前景包围盒裁剪与 affine 平移 ✅
//!
//! 实现位于 `fetal-qa/src/data/crop.rs`.
//!
//! ### 定长填充 (217, 178, 60, 1) ✅
//!
//! 实现位于 `fetal-qa/src/data/pad.rs`.
//!
//! ### 批量评分, 以固定上限 10000 归一化 ✅
//!
//! 实现位于 `fetal-qa/src/score`.
//!
//! ### 阈值挑选与裁剪结果持久化 ✅
//!
//! 实现位于 `fetal-qa/src/select.rs`.

/// 三维索引, 按 `(x, y, z)` 组织.
pub type Idx3d = (usize, usize, usize);

/// 3D MRI nii 文件基础数据结构.
mod data;

pub use data::{
    cropped_file_name, normalize, Affine, BoundingBox, CropError, CroppedVolume, LoadError,
    MriVolume, NiftiHeaderAttr, PaddedVolume, ShapeNormalizer,
};

pub mod consts;
pub mod dataset;
pub mod pipeline;
pub mod prelude;
pub mod score;
pub mod select;
pub mod sink;
