use vergen::EmitBuilder;

fn main() {
    // 生成构建信息；非 git 环境（例如从源码包构建）下退化为仅构建时间戳
    if EmitBuilder::builder().all_build().all_git().emit().is_err() {
        EmitBuilder::builder()
            .all_build()
            .emit()
            .expect("Failed to generate build information");
    }
}
