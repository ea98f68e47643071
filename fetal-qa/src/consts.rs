//! 通用常量.

use crate::Idx3d;

/// 模型输入的空间形状 `(x, y, z)`. 通道维固定为 1.
pub const TARGET_SHAPE: Idx3d = (217, 178, 60);

/// 强度上限. 规范化时截断到 `[0, INTENSITY_CEILING]`,
/// 批量归一化时也以它 (而不是实际观测到的最大值) 作为分母上限.
pub const INTENSITY_CEILING: f32 = 10000.0;

/// 保存裁剪结果时插入到扩展名前的文件名后缀.
pub const CROP_SUFFIX: &str = "_crop";

/// 默认的挑选阈值.
pub const DEFAULT_THRESHOLD: f64 = 0.4;

/// 阈值超过该值时, 挑选流程整体关闭.
pub const SELECTION_DISABLED_ABOVE: f64 = 1.0;

/// 默认处理的文件名模式.
pub const DEFAULT_INPUT_FILTER: &str = "*.nii";

/// 仅评分模式下默认处理的文件名模式.
pub const DEFAULT_PREDICT_FILTER: &str = "*_crop.nii";

/// 默认输出的 CSV 文件名.
pub const DEFAULT_OUTPUT_FILE: &str = "quality_assessment.csv";

/// 仅评分模式下默认输出的 CSV 文件名.
pub const DEFAULT_PREDICT_OUTPUT_FILE: &str = "predictions.csv";

/// 默认保存入选体数据的目录名.
pub const DEFAULT_DESTINATION: &str = "Best_Images_crop";

/// 单个填充后体数据占用的字节数.
pub const PADDED_VOLUME_BYTES: usize =
    TARGET_SHAPE.0 * TARGET_SHAPE.1 * TARGET_SHAPE.2 * std::mem::size_of::<f32>();
