// Build script to compile the ray tracing compute shader to SPIR-V

use std::process::Command;
use std::path::Path;

fn main() {
    println!("cargo:rerun-if-changed=shaders/raytrace.comp");

    // Compile shaders using glslc (part of Vulkan SDK)
    compile_shader("shaders/raytrace.comp", "shaders/comp.spv");
}

fn compile_shader(input: &str, output: &str) {
    let input_path = Path::new(input);
    let output_path = Path::new(output);

    // Check if glslc is available
    let result = Command::new("glslc")
        .arg(input_path)
        .arg("-o")
        .arg(output_path)
        .status();

    // The binary is consumed at runtime, so a failed compile must not break the crate build
    match result {
        Ok(status) if status.success() => {}
        Ok(status) => {
            println!(
                "cargo:warning=Failed to compile {}: exit code {:?}",
                input,
                status.code()
            );
        }
        Err(e) => {
            println!("cargo:warning=glslc not found ({}), {} was not rebuilt", e, output);
            println!("cargo:warning=Compile manually: glslc {} -o {}", input, output);
        }
    }
}
