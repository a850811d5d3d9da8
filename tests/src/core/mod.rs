mod asm;
mod codec;
